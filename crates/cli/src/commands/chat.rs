//! `sovwren chat` — the interactive cockpit session.

use std::sync::Arc;

use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::warn;

use sovwren_config::AppConfig;
use sovwren_core::{pref, Initiative, Lens, Mode};
use sovwren_orchestrator::{NodeReply, Orchestrator, OrchestratorOptions, Outcome, IDLE_THRESHOLD};
use sovwren_providers::CouncilSeat;
use sovwren_rag::{MemoryStore, Retriever, VectorStore};
use sovwren_search::{DuckDuckGoAdapter, OllamaWebAdapter, SearchGate};
use sovwren_session::Profile;

pub async fn run(
    model: Option<String>,
    profile: Option<String>,
    fresh: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    std::fs::create_dir_all(AppConfig::workspace_dir())?;
    std::fs::create_dir_all(AppConfig::bookmarks_dir())?;
    std::fs::create_dir_all(AppConfig::profiles_dir())?;

    let store = super::wiring::open_store().await?;
    if fresh {
        store.set_preference(pref::LAST_SESSION_ID, "").await?;
    }

    let client = super::wiring::build_client(&config)?;

    // Preferences fill in whatever the flags left unspecified.
    let model = match model {
        Some(m) => m,
        None => store
            .get_preference(pref::LAST_MODEL)
            .await?
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| config.default_model.clone()),
    };
    let profile_name = match profile {
        Some(p) => p,
        None => store
            .get_preference(pref::LAST_PROFILE)
            .await?
            .filter(|p| !p.is_empty())
            .or_else(|| config.default_profile.clone())
            .unwrap_or_else(|| "default".to_string()),
    };
    let assistant_name = match &config.assistant_name {
        Some(name) => name.clone(),
        None => store
            .get_preference(pref::ASSISTANT_NAME)
            .await?
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "Node".to_string()),
    };
    let auto_load_refs = store
        .get_preference(pref::AUTO_LOAD_REFS)
        .await?
        .as_deref()
        == Some("true");
    let show_timestamps = store
        .get_preference(pref::SHOW_TIMESTAMPS)
        .await?
        .as_deref()
        == Some("true");

    // Vector index with stale-reference pruning before first retrieval.
    let retriever = match VectorStore::open(AppConfig::index_path(), AppConfig::workspace_dir()) {
        Ok(mut index) => {
            match index.prune_stale() {
                Ok(0) => {}
                Ok(n) => println!("  Pruned {n} stale chunks from the knowledge index."),
                Err(e) => warn!("stale-reference pruning failed: {e}"),
            }
            Some(Retriever::new(
                Arc::new(Mutex::new(index)),
                client.clone(),
                &config.embedding_model,
                config.timeouts.embedding(),
                config.timeouts.vector_search(),
            ))
        }
        Err(e) => {
            warn!("knowledge index unavailable: {e}");
            None
        }
    };

    let mut search = SearchGate::new(config.search.max_results);
    match DuckDuckGoAdapter::new(config.timeouts.web_search()) {
        Ok(adapter) => search.register(Box::new(adapter)),
        Err(e) => warn!("duckduckgo adapter unavailable: {e}"),
    }
    match OllamaWebAdapter::new(config.search.api_key.clone(), config.timeouts.web_search()) {
        Ok(adapter) => search.register(Box::new(adapter)),
        Err(e) => warn!("ollama web adapter unavailable: {e}"),
    }
    if config.search.open_at_startup {
        if let Err(e) = search.open(Some(&config.search.default_provider)) {
            warn!("could not open search gate: {e}");
        }
    }

    let council = match CouncilSeat::from_config(&config) {
        Ok(seat) => Some(seat),
        Err(e) => {
            warn!("council seat unavailable: {e}");
            None
        }
    };

    let memory = MemoryStore::new(AppConfig::memory_path());
    let profile = Profile::load_named(&AppConfig::profiles_dir(), &profile_name);

    let mut orch = Orchestrator::new(OrchestratorOptions {
        store: store.clone(),
        client,
        council,
        search,
        retriever,
        memory,
        profile,
        profile_name,
        model: model.clone(),
        assistant_name: assistant_name.clone(),
        confirmation_ttl: config.timeouts.confirmation(),
        auto_load_refs,
        workspace_dir: std::env::current_dir().unwrap_or_default(),
        bookmarks_dir: AppConfig::bookmarks_dir(),
        profiles_dir: AppConfig::profiles_dir(),
    })
    .await?;

    orch.restore(
        store
            .get_preference(pref::LAST_MODE)
            .await?
            .and_then(|s| Mode::parse(&s)),
        store
            .get_preference(pref::LAST_LENS)
            .await?
            .and_then(|s| Lens::parse(&s)),
        store
            .get_preference(pref::INITIATIVE_DEFAULT)
            .await?
            .and_then(|s| Initiative::parse(&s)),
    );

    banner(&orch, &model, &assistant_name);

    let stdin = io::stdin();
    let reader = BufReader::new(stdin);
    let mut lines = reader.lines();
    let mut stdout = io::stdout();

    stdout.write_all(b"  You > ").await?;
    stdout.flush().await?;

    loop {
        // next_line is cancel safe, so racing it against the idle timer
        // never drops buffered input.
        let line = loop {
            tokio::select! {
                line = lines.next_line() => break line?,
                _ = tokio::time::sleep(IDLE_THRESHOLD) => {
                    if orch.poll_idle() {
                        println!();
                        println!("  (idle: the cockpit dims, initiative drops to low)");
                        stdout.write_all(b"  You > ").await?;
                        stdout.flush().await?;
                    }
                }
            }
        };
        let Some(line) = line else {
            break;
        };
        let trimmed = line.trim();
        if trimmed == "exit" || trimmed == "quit" {
            break;
        }

        match orch.handle_line(trimmed).await {
            Ok(Outcome::Reply(reply)) => print_reply(&reply, &assistant_name, show_timestamps),
            Ok(Outcome::System(lines)) => {
                println!();
                for line in lines {
                    for part in line.lines() {
                        println!("  {part}");
                    }
                }
                println!();
            }
            Ok(Outcome::Ignored) => {}
            Err(e) => {
                eprintln!("  [Error] {e}");
                println!();
            }
        }

        stdout.write_all(b"  You > ").await?;
        stdout.flush().await?;
    }

    println!();
    println!("  The cockpit is yours. Goodbye.");
    Ok(())
}

fn banner(orch: &Orchestrator, model: &str, assistant_name: &str) {
    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║            Sovwren — Node Cockpit            ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Session:   {}", orch.session_id());
    println!("  Model:     {model}");
    println!("  Node:      {assistant_name}");
    println!("  Mode:      {}", orch.state().mode.as_str());
    println!();
    println!("  Type /help for commands, 'exit' to quit.");
    println!();
}

fn print_reply(reply: &NodeReply, assistant_name: &str, show_timestamps: bool) {
    println!();
    for notice in &reply.notices {
        println!("  [!] {notice}");
    }
    let stamp = if show_timestamps {
        format!("[{}] ", chrono_stamp())
    } else {
        String::new()
    };
    let mut first = true;
    for line in reply.text.lines() {
        if first {
            println!("  {stamp}{assistant_name} > {line}");
            first = false;
        } else {
            println!("  {}{} > {line}", " ".repeat(stamp.len()), assistant_name);
        }
    }
    if reply.reasoning_hidden {
        println!("  (reasoning trace hidden)");
    }
    if let Some(citations) = &reply.citations {
        println!();
        println!("  Sources:");
        for line in citations.lines() {
            println!("  {line}");
        }
    }
    println!();
}

fn chrono_stamp() -> String {
    chrono::Local::now().format("%H:%M").to_string()
}
