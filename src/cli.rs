//! nina-memory CLI - inspect and feed a conversational memory snapshot
//!
//! Usage:
//!   nina-memory add "user" "response"     Record a conversation turn
//!   nina-memory context "query"           Build the response context
//!   nina-memory search "query"            Ranked conversation search
//!   nina-memory prefer <key> <value>      Learn a user preference
//!   nina-memory pref <key>                Show a user preference
//!   nina-memory learn <topic> "fact"      Learn a fact
//!   nina-memory facts <topic>             List facts about a topic
//!   nina-memory entity <name>             Show an entity's graph node
//!   nina-memory stats                     Show collection counts
//!   nina-memory compress                  Run a compression pass
//!   nina-memory clear --force             Erase all memory

use clap::{Parser, Subcommand};
use colored::*;
use nina_memory::{MemoryConfig, MemoryStore};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "nina-memory")]
#[command(about = "Hierarchical conversational memory for the Nina assistant")]
#[command(version)]
struct Cli {
    /// Snapshot file (overrides the config file)
    #[arg(short, long, env = "NINA_MEMORY_SNAPSHOT")]
    snapshot: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, env = "NINA_MEMORY_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a user/response exchange
    Add {
        /// What the user said
        user: String,

        /// What Nina answered
        response: String,
    },

    /// Build the context string for answering a query
    Context {
        query: String,

        /// Token budget (defaults to the configured one)
        #[arg(short, long)]
        max_tokens: Option<usize>,
    },

    /// Search past conversations
    Search {
        query: String,

        /// Maximum results
        #[arg(short, long, default_value = "5")]
        limit: usize,
    },

    /// Learn a user preference
    Prefer { key: String, value: String },

    /// Show a user preference
    Pref { key: String },

    /// Learn a fact about a topic
    Learn { topic: String, fact: String },

    /// List facts about a topic
    Facts { topic: String },

    /// Show what the entity graph knows about a name
    Entity { name: String },

    /// Show statistics
    Stats,

    /// Compress old, unimportant conversations now
    Compress,

    /// Erase all memory
    Clear {
        /// Skip confirmation
        #[arg(short, long)]
        force: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| default.into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<MemoryConfig> {
    let mut config = match &cli.config {
        Some(path) => MemoryConfig::from_toml_file(path)?,
        None => MemoryConfig::default(),
    };
    if let Some(snapshot) = &cli.snapshot {
        config.snapshot_path = snapshot.clone();
    }
    Ok(config)
}

fn importance_label(importance: f32) -> ColoredString {
    let text = format!("{importance:.2}");
    if importance >= 0.8 {
        text.green()
    } else if importance >= 0.6 {
        text.yellow()
    } else {
        text.normal()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(&cli)?;
    let mut store = MemoryStore::open(config).await?;

    match cli.command {
        Commands::Add { user, response } => cmd_add(&mut store, &user, &response).await,
        Commands::Context { query, max_tokens } => cmd_context(&store, &query, max_tokens).await,
        Commands::Search { query, limit } => cmd_search(&store, &query, limit).await,
        Commands::Prefer { key, value } => {
            store.learn_user_preference(&key, &value).await;
            println!("{} {} = {}", "Preference learned:".green(), key.cyan(), value);
            Ok(())
        }
        Commands::Pref { key } => {
            match store.get_user_preference(&key) {
                Some(value) => println!("{} = {}", key.cyan(), value),
                None => println!("{}", format!("No preference '{key}'").yellow()),
            }
            Ok(())
        }
        Commands::Learn { topic, fact } => {
            store.learn_fact(&topic, &fact).await;
            println!("{} {}", "Fact learned about".green(), topic.cyan());
            Ok(())
        }
        Commands::Facts { topic } => cmd_facts(&store, &topic),
        Commands::Entity { name } => cmd_entity(&store, &name),
        Commands::Stats => cmd_stats(&store),
        Commands::Compress => cmd_compress(&mut store).await,
        Commands::Clear { force } => cmd_clear(&mut store, force).await,
    }
}

async fn cmd_add(store: &mut MemoryStore, user: &str, response: &str) -> anyhow::Result<()> {
    let id = store.add_conversation(user, response, None).await;
    let Some(turn) = store.history().iter().find(|t| t.id == id) else {
        println!("{} {}", "Conversation recorded and compressed:".green(), id.cyan());
        return Ok(());
    };

    println!("{}", "Conversation recorded".green().bold());
    println!("  ID:          {}", id.cyan());
    println!("  Importance:  {}", importance_label(turn.importance));
    if !turn.entities.is_empty() {
        let entities: Vec<_> = turn.entities.iter().map(String::as_str).collect();
        println!("  Entities:    {}", entities.join(", "));
    }
    if !turn.topics.is_empty() {
        let topics: Vec<_> = turn.topics.iter().map(String::as_str).collect();
        println!("  Topics:      {}", topics.join(", "));
    }
    Ok(())
}

async fn cmd_context(
    store: &MemoryStore,
    query: &str,
    max_tokens: Option<usize>,
) -> anyhow::Result<()> {
    let context = store.get_context_for_response(query, max_tokens).await;
    if context.is_empty() {
        println!("{}", "Nothing relevant in memory".yellow());
    } else {
        println!("{context}");
    }
    Ok(())
}

async fn cmd_search(store: &MemoryStore, query: &str, limit: usize) -> anyhow::Result<()> {
    let results = store.search_conversations(query, limit).await;
    if results.is_empty() {
        println!("{}", "No conversations found".yellow());
        return Ok(());
    }

    println!(
        "{}",
        format!("Found {} conversations:", results.len()).bold().green()
    );
    println!();

    for (i, result) in results.iter().enumerate() {
        let id = result.turn_id.as_deref().unwrap_or("-");
        println!(
            "{}. {} (score {:.3}, importance {}, {})",
            i + 1,
            id.dimmed(),
            result.composite_score,
            importance_label(result.importance),
            result.timestamp.as_deref().unwrap_or("unknown time")
        );
        for line in result.text.lines() {
            println!("   {line}");
        }
    }
    Ok(())
}

fn cmd_facts(store: &MemoryStore, topic: &str) -> anyhow::Result<()> {
    let facts = store.get_facts_about(topic);
    if facts.is_empty() {
        println!("{}", format!("No facts about '{topic}'").yellow());
        return Ok(());
    }

    println!("{}", format!("Facts about {topic}:").bold());
    for entry in facts {
        println!(
            "  {} {}",
            entry.timestamp.format("%Y-%m-%d %H:%M").to_string().dimmed(),
            entry.fact
        );
    }
    Ok(())
}

fn cmd_entity(store: &MemoryStore, name: &str) -> anyhow::Result<()> {
    let Some(node) = store.graph().node(name) else {
        println!("{}", format!("Entity '{name}' not found").red());
        return Ok(());
    };

    let join = |items: &std::collections::BTreeSet<String>| {
        items.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
    };

    println!("{}", name.bold().underline());
    println!("  Connections:    {}", join(&node.connections));
    println!("  Topics:         {}", join(&node.topics));
    println!("  Conversations:  {}", node.conversations.len());
    Ok(())
}

fn cmd_stats(store: &MemoryStore) -> anyhow::Result<()> {
    let stats = store.get_memory_stats();

    println!("{}", "Memory Statistics".bold().underline());
    println!("  Conversations:      {}", stats.conversations);
    println!("  Compressed:         {}", stats.compressed_memories);
    println!("  Preferences:        {}", stats.preferences);
    println!("  Learned facts:      {}", stats.learned_facts);
    println!("  Fact topics:        {}", stats.topics);
    println!("  Entities in graph:  {}", stats.entities_in_graph);
    println!("  Connections:        {}", stats.total_connections);
    println!(
        "  Snapshot:           {}",
        store.config().snapshot_path.display().to_string().dimmed()
    );
    Ok(())
}

async fn cmd_compress(store: &mut MemoryStore) -> anyhow::Result<()> {
    let report = store.run_compression().await;

    println!("{}", "Compression complete".green().bold());
    println!("  Checked:     {}", report.checked);
    println!("  Candidates:  {}", report.candidates);
    println!("  Compressed:  {}", report.compressed);
    if report.deferred > 0 {
        println!("  Deferred:    {}", report.deferred.to_string().yellow());
    }
    Ok(())
}

async fn cmd_clear(store: &mut MemoryStore, force: bool) -> anyhow::Result<()> {
    if !force {
        let stats = store.get_memory_stats();
        println!(
            "About to erase {} conversations, {} summaries and {} facts",
            stats.conversations, stats.compressed_memories, stats.learned_facts
        );
        println!("Are you sure? (yes/no)");

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if input.trim() != "yes" {
            println!("Cancelled");
            return Ok(());
        }
    }

    store.clear().await;
    println!("{}", "Memory cleared".green());
    Ok(())
}
