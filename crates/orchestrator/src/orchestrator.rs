//! The turn pipeline.
//!
//! [`Orchestrator`] owns the session state and wires every collaborator
//! together: the durable store, the local model client, the search and
//! council gates, the retriever, the memory store, and the consent
//! broker. One call to [`Orchestrator::handle_line`] runs a full turn:
//! command routing, memory intents, `@ref` gating, augmentation,
//! prompt composition, generation, persistence, and band accounting.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tracing::{debug, info, warn};

use sovwren_core::client::{GenerateRequest, LlmClient};
use sovwren_core::{
    pref, ChatMessage, ConsentError, Error, EventKind, GateState, SessionState,
};
use sovwren_providers::CouncilSeat;
use sovwren_rag::{MemoryStore, Retriever};
use sovwren_search::{SearchGate, SearchResult};
use sovwren_session::{
    compose, prepare_brief, BriefInput, ConsentBroker, ConsentKind, ContextAccountant, Pending,
    Profile, RequestType, Slot,
};
use sovwren_store::{SessionUpdate, Store};

use crate::bookmark;
use crate::command::{Command, HELP_TEXT};
use crate::intent;

/// Exchange pairs kept in working memory before the oldest are dropped.
pub const MAX_RAM_EXCHANGES: usize = 10;

/// Inactivity span after which the session is considered idle.
pub const IDLE_THRESHOLD: Duration = Duration::from_secs(45);

/// Exchange pairs replayed to the model; RAM retains more for recall.
pub const HISTORY_CONTEXT_TURNS: usize = 5;

/// Retrieval chunks requested per turn.
const RETRIEVAL_LIMIT: usize = 3;

/// Per-turn generation statistics surfaced by `/monitor`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TurnStats {
    pub latency_ms: u64,
    pub tokens_estimate: usize,
    pub tokens_per_sec: Option<f64>,
}

/// A generated reply plus everything the UI needs alongside it.
#[derive(Debug, Clone)]
pub struct NodeReply {
    /// Display text, with reasoning traces stripped.
    pub text: String,
    /// True when reasoning tags were removed from the display text.
    pub reasoning_hidden: bool,
    /// Source citations when the reply drew on web search.
    pub citations: Option<String>,
    /// Degradation and transition notices accumulated during the turn.
    pub notices: Vec<String>,
    pub stats: TurnStats,
}

/// What a single input line produced.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// The Node generated a reply.
    Reply(NodeReply),
    /// Local handling produced informational lines; no model call.
    System(Vec<String>),
    /// Blank input, nothing to do.
    Ignored,
}

impl Outcome {
    fn line(text: impl Into<String>) -> Self {
        Outcome::System(vec![text.into()])
    }
}

/// Everything the orchestrator needs at construction time.
pub struct OrchestratorOptions {
    pub store: Arc<Store>,
    pub client: Arc<dyn LlmClient>,
    pub council: Option<CouncilSeat>,
    pub search: SearchGate,
    pub retriever: Option<Retriever>,
    pub memory: MemoryStore,
    pub profile: Profile,
    pub profile_name: String,
    pub model: String,
    pub assistant_name: String,
    pub confirmation_ttl: Duration,
    pub auto_load_refs: bool,
    pub workspace_dir: PathBuf,
    pub bookmarks_dir: PathBuf,
    pub profiles_dir: PathBuf,
}

pub struct Orchestrator {
    store: Arc<Store>,
    client: Arc<dyn LlmClient>,
    council: Option<CouncilSeat>,
    search: SearchGate,
    retriever: Option<Retriever>,
    memory: MemoryStore,
    broker: ConsentBroker,
    accountant: ContextAccountant,

    state: SessionState,
    session_id: String,
    profile: Profile,
    profile_name: String,
    model: String,
    message_count: i64,

    history: Vec<ChatMessage>,
    ref_injection: Option<String>,
    active_file: Option<(String, String)>,
    last_search_query: String,
    last_search_results: Vec<SearchResult>,
    last_activity: Instant,
    last_stats: Option<TurnStats>,

    auto_load_refs: bool,
    workspace_dir: PathBuf,
    bookmarks_dir: PathBuf,
    profiles_dir: PathBuf,
}

impl Orchestrator {
    /// Build the orchestrator and open (or create) its session row.
    pub async fn new(opts: OrchestratorOptions) -> Result<Self, Error> {
        let mut resumed = false;
        let session_id = match opts.store.get_preference(pref::LAST_SESSION_ID).await? {
            Some(id) if opts.store.get_session(&id).await?.is_some() => {
                info!(session = %id, "resuming previous session");
                resumed = true;
                id
            }
            _ => new_session_id(),
        };
        opts.store
            .create_session(&session_id, Some(&opts.model))
            .await?;
        let message_count = opts
            .store
            .get_session(&session_id)
            .await?
            .map(|s| s.message_count)
            .unwrap_or(0);

        // A resumed session carries its recent exchanges back into RAM.
        let mut history = Vec::new();
        if resumed {
            let turns = opts.store.get_session_turns(&session_id).await?;
            let start = turns.len().saturating_sub(MAX_RAM_EXCHANGES);
            for turn in &turns[start..] {
                history.push(ChatMessage::steward(turn.steward_text.as_str()));
                history.push(ChatMessage::node(turn.node_text.as_str()));
            }
        }

        let mut state = SessionState::new(&opts.assistant_name);
        state.search_gate = self::gate_state(&opts.search);
        state.council_gate = match &opts.council {
            Some(seat) => GateState::Open(seat.model().to_string()),
            None => GateState::Closed,
        };

        let accountant = ContextAccountant::new(&opts.model);
        Ok(Self {
            store: opts.store,
            client: opts.client,
            council: opts.council,
            search: opts.search,
            retriever: opts.retriever,
            memory: opts.memory,
            broker: ConsentBroker::new(opts.confirmation_ttl),
            accountant,
            state,
            session_id,
            profile: opts.profile,
            profile_name: opts.profile_name,
            model: opts.model,
            message_count,
            history,
            ref_injection: None,
            active_file: None,
            last_search_query: String::new(),
            last_search_results: Vec::new(),
            last_activity: Instant::now(),
            last_stats: None,
            auto_load_refs: opts.auto_load_refs,
            workspace_dir: opts.workspace_dir,
            bookmarks_dir: opts.bookmarks_dir,
            profiles_dir: opts.profiles_dir,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
        self.accountant.set_model(&self.model);
    }

    /// Restore saved session-state preferences without logging events.
    pub fn restore(
        &mut self,
        mode: Option<sovwren_core::Mode>,
        lens: Option<sovwren_core::Lens>,
        initiative: Option<sovwren_core::Initiative>,
    ) {
        if let Some(mode) = mode {
            self.state.mode = mode;
        }
        if let Some(lens) = lens {
            self.state.lens = lens;
        }
        if let Some(initiative) = initiative {
            self.state.initiative = initiative;
        }
    }

    /// Mutators for the UI surface. Each logs a protocol event.
    pub async fn set_mode(&mut self, mode: sovwren_core::Mode) {
        self.state.mode = mode;
        self.store
            .log_event_best_effort(
                &self.session_id,
                EventKind::ModeChanged,
                json!({ "mode": mode.as_str() }),
            )
            .await;
    }

    pub async fn set_lens(&mut self, lens: sovwren_core::Lens) {
        self.state.lens = lens;
        self.store
            .log_event_best_effort(
                &self.session_id,
                EventKind::LensChanged,
                json!({ "lens": lens.as_str() }),
            )
            .await;
    }

    pub fn set_initiative(&mut self, initiative: sovwren_core::Initiative) {
        self.state.initiative = initiative;
    }

    pub async fn toggle_idleness(&mut self) {
        if self.state.idleness {
            self.state.leave_idleness();
        } else {
            self.state.enter_idleness();
        }
        self.store
            .log_event_best_effort(
                &self.session_id,
                EventKind::IdlenessToggled,
                json!({ "idleness": self.state.idleness }),
            )
            .await;
    }

    /// Dim the cockpit once the steward has been away past the idle
    /// threshold while idleness is active. Returns true only on the
    /// no-dim to dim edge so the caller can surface it once.
    pub fn poll_idle(&mut self) -> bool {
        if self.state.idleness
            && !self.state.idle_dim
            && self.last_activity.elapsed() >= IDLE_THRESHOLD
        {
            self.state.idle_dim = true;
            debug!("cockpit dimmed after idle threshold");
            return true;
        }
        false
    }

    pub fn open_search_gate(&mut self, provider: Option<&str>) -> Result<(), Error> {
        self.search.open(provider)?;
        self.state.search_gate = gate_state(&self.search);
        Ok(())
    }

    pub fn close_search_gate(&mut self) {
        self.search.close();
        self.state.search_gate = GateState::Closed;
    }

    /// Queue a two-phase session delete. `/confirm-yes` dispatches it.
    pub async fn request_delete_session(&mut self, id: &str) -> Result<String, Error> {
        let session = self
            .store
            .get_session(id)
            .await?
            .ok_or_else(|| Error::Internal(format!("no such session: {id}")))?;
        let preview = format!(
            "Delete session '{}' ({} exchanges, last active {})?",
            session.display_name(),
            session.message_count,
            session.last_active.format("%Y-%m-%d %H:%M"),
        );
        self.broker.propose(
            ConsentKind::DeleteSession,
            json!({ "id": id }),
            preview.clone(),
        );
        Ok(format!("{preview}\nConfirm with /confirm-yes or /confirm-no (expires in 60s)."))
    }

    /// Queue a two-phase delete of every session.
    pub async fn request_delete_all(&mut self) -> Result<String, Error> {
        let count = self.store.count_sessions().await?;
        let preview = format!("Delete ALL {count} sessions and their history?");
        self.broker
            .propose(ConsentKind::DeleteAllSessions, json!({}), preview.clone());
        Ok(format!("{preview}\nConfirm with /confirm-yes or /confirm-no (expires in 60s)."))
    }

    /// Handle one line of Steward input.
    pub async fn handle_line(&mut self, input: &str) -> Result<Outcome, Error> {
        let input = input.trim();
        if input.is_empty() {
            return Ok(Outcome::Ignored);
        }

        if self.state.idle_dim && self.last_activity.elapsed() >= IDLE_THRESHOLD {
            debug!("steward returned from idle");
        }
        self.state.idle_dim = false;
        self.last_activity = Instant::now();

        if let Some(command) = Command::parse(input) {
            return self.handle_command(command).await;
        }

        if let Some(content) = intent::memory_intent(input) {
            return self.handle_memory_write(content).await;
        }

        let refs = intent::extract_refs(input);
        if !refs.is_empty() && intent::has_load_verb(input) {
            if self.auto_load_refs {
                let mut notices = Vec::new();
                self.load_refs(&refs, &mut notices).await;
                return self.run_turn(input, notices).await;
            }
            let preview = format!("Load {} into context: {}?", plural(refs.len(), "file"), refs.join(", "));
            self.broker.propose(
                ConsentKind::RefLoad,
                json!({ "message": input, "refs": refs }),
                preview.clone(),
            );
            return Ok(Outcome::System(vec![
                preview,
                "Approve with /load-yes or decline with /load-no (expires in 60s).".to_string(),
            ]));
        }

        self.run_turn(input, Vec::new()).await
    }

    // --- memory intent ---

    async fn handle_memory_write(&mut self, content: &str) -> Result<Outcome, Error> {
        let (name, entity_type) = intent::extract_memory_entity(content);
        self.memory
            .add_observations(&name, &entity_type, &[content.to_string()])?;
        info!(entity = %name, "memory observation stored");
        Ok(Outcome::line(format!("Remembered under '{name}' ({entity_type}).")))
    }

    // --- @ref loading ---

    async fn load_refs(&mut self, refs: &[String], notices: &mut Vec<String>) {
        let mut sections = Vec::new();
        for rel in refs {
            let path = self.workspace_dir.join(rel);
            match std::fs::read_to_string(&path) {
                Ok(content) => {
                    if let Some(retriever) = &self.retriever {
                        match retriever.ingest_file(rel, &content).await {
                            Ok(chunks) => debug!(file = %rel, chunks, "reference indexed"),
                            Err(e) => warn!(file = %rel, "reference indexing failed: {e}"),
                        }
                    }
                    self.store
                        .log_event_best_effort(
                            &self.session_id,
                            EventKind::FileOpened,
                            json!({ "path": rel, "chars": content.chars().count() }),
                        )
                        .await;
                    sections.push(format!("--- {rel} ---\n{content}"));
                    self.active_file = Some((rel.clone(), content));
                }
                Err(e) => {
                    warn!(file = %rel, "reference load failed: {e}");
                    notices.push(format!("Could not load @{rel}: {e}"));
                }
            }
        }
        if !sections.is_empty() {
            self.ref_injection = Some(format!("Referenced files:\n{}", sections.join("\n\n")));
        }
    }

    // --- the main pipeline ---

    async fn run_turn(&mut self, input: &str, mut notices: Vec<String>) -> Result<Outcome, Error> {
        let greeting = intent::is_greeting(input);

        // Outward augmentation first: web search while the gate is open.
        let mut context_parts: Vec<String> = Vec::new();
        let mut citations = None;
        if self.search.is_open() && !greeting {
            match self.search.search(input).await {
                Ok(results) if !results.is_empty() => {
                    context_parts.push(SearchGate::format_for_context(&results));
                    citations = Some(SearchGate::format_citations(&results));
                    self.store
                        .log_event_best_effort(
                            &self.session_id,
                            EventKind::SearchPerformed,
                            json!({ "query": input, "results": results.len() }),
                        )
                        .await;
                    self.last_search_query = input.to_string();
                    self.last_search_results = results;
                }
                Ok(_) => debug!("search returned no results"),
                Err(e) => notices.push(format!("Web search unavailable: {e}")),
            }
        }

        // Memory: explicit queries get a visible block, otherwise only
        // entities the message actually touches are injected.
        match self.memory_block(input) {
            Ok(Some(block)) => context_parts.push(block),
            Ok(None) => {}
            Err(e) => warn!("memory lookup failed: {e}"),
        }

        // Workspace retrieval, skipped for greetings.
        if !greeting {
            if let Some(retriever) = &self.retriever {
                match retriever.retrieve_context(input, RETRIEVAL_LIMIT, false).await {
                    Ok(Some(retrieved)) => context_parts.push(retrieved.text),
                    Ok(None) => {}
                    Err(e) => warn!("retrieval failed: {e}"),
                }
            }
        }

        // One-shot file injection from an approved @ref load.
        if let Some(refs) = self.ref_injection.take() {
            context_parts.insert(0, refs);
        }

        let context = if context_parts.is_empty() {
            None
        } else {
            Some(context_parts.join("\n\n"))
        };

        let context_summary = context.as_ref().map(|c| {
            if c.chars().count() > 800 {
                let head: String = c.chars().take(800).collect();
                format!("{head}...")
            } else {
                c.clone()
            }
        });

        // Account before composing so the band block reflects this turn.
        let assessment = self.accountant.assess(
            self.history
                .iter()
                .map(|m| m.content.as_str())
                .chain(std::iter::once(input)),
            context.iter().map(|c| c.as_str()),
        );
        if let Some((from, to)) = assessment.transition {
            notices.push(format!("Context load moved {} -> {}", from.as_str(), to.as_str()));
            self.store
                .log_event_best_effort(
                    &self.session_id,
                    EventKind::ContextBandTransition,
                    json!({ "from": from.as_str(), "to": to.as_str(), "ratio": assessment.ratio }),
                )
                .await;
        }
        self.state.context_band = assessment.band;

        let first_warning = self.accountant.first_warning(assessment.band);
        let system = compose(&self.profile, &self.state, first_warning);

        let recent = self
            .history
            .len()
            .saturating_sub(HISTORY_CONTEXT_TURNS * 2);
        let request = GenerateRequest {
            model: self.model.clone(),
            system: Some(system),
            input: input.to_string(),
            history: self.history[recent..].to_vec(),
            context,
            temperature: 0.7,
            max_tokens: None,
            stream: false,
        };

        let started = Instant::now();
        let response = self.client.generate(request).await?;
        let latency_ms = started.elapsed().as_millis() as u64;
        let tokens_estimate = response.text.chars().count().div_ceil(4);
        let tokens_per_sec = if latency_ms > 0 {
            Some(tokens_estimate as f64 * 1000.0 / latency_ms as f64)
        } else {
            None
        };
        let stats = TurnStats { latency_ms, tokens_estimate, tokens_per_sec };
        self.last_stats = Some(stats);

        // Working memory keeps the unstripped text; only display hides it.
        let (display, reasoning_hidden) = intent::strip_reasoning(&response.text);
        self.history.push(ChatMessage::steward(input));
        self.history.push(ChatMessage::node(&response.text));
        trim_history(&mut self.history);

        self.accountant.acknowledge(assessment.band);
        self.persist_turn(input, &response.text, context_summary.as_deref(), &mut notices)
            .await;

        Ok(Outcome::Reply(NodeReply {
            text: display,
            reasoning_hidden,
            citations,
            notices,
            stats,
        }))
    }

    fn memory_block(&self, input: &str) -> Result<Option<String>, sovwren_core::MemoryError> {
        if intent::is_memory_query(input) {
            let entities = self.memory.all()?;
            if entities.is_empty() {
                return Ok(Some("Known memories:\n(none yet)".to_string()));
            }
            return Ok(Some(format!(
                "Known memories:\n{}",
                MemoryStore::format_for_injection(&entities)
            )));
        }
        let hits = self.memory.search(input)?;
        if hits.is_empty() {
            Ok(None)
        } else {
            Ok(Some(format!(
                "Relevant memories:\n{}",
                MemoryStore::format_for_injection(&hits)
            )))
        }
    }

    /// Persist the turn. Storage trouble degrades to a notice rather
    /// than losing the reply that was already generated.
    async fn persist_turn(
        &mut self,
        steward: &str,
        node: &str,
        context_summary: Option<&str>,
        notices: &mut Vec<String>,
    ) {
        let result = self
            .store
            .append_turn(
                &self.session_id,
                steward,
                node,
                Some(&self.model),
                context_summary,
            )
            .await;
        if let Err(e) = result {
            warn!("failed to persist turn: {e}");
            notices.push("This exchange was not saved to disk.".to_string());
            return;
        }
        self.message_count += 1;
        let update = SessionUpdate {
            message_count: Some(self.message_count),
            first_message: if self.message_count == 1 {
                Some(steward.to_string())
            } else {
                None
            },
            model: Some(self.model.clone()),
        };
        if let Err(e) = self.store.update_session(&self.session_id, update).await {
            warn!("failed to update session row: {e}");
        }
        if let Err(e) = self
            .store
            .set_preference(pref::LAST_SESSION_ID, &self.session_id)
            .await
        {
            warn!("failed to record last session: {e}");
        }
    }

    // --- slash commands ---

    async fn handle_command(&mut self, command: Command) -> Result<Outcome, Error> {
        match command {
            Command::Help => Ok(Outcome::line(HELP_TEXT)),
            Command::Clear => {
                self.history.clear();
                self.broker.clear();
                self.ref_injection = None;
                Ok(Outcome::line("Working memory cleared."))
            }
            Command::Save => self.save_preferences().await,
            Command::Bookmark(name) => self.weave_bookmark(name.as_deref()).await,
            Command::Session => self.show_session().await,
            Command::Context => Ok(Outcome::System(self.show_context())),
            Command::Models => self.show_models().await,
            Command::Profiles => Ok(Outcome::System(self.show_profiles())),
            Command::Monitor => Ok(Outcome::System(self.show_monitor())),
            Command::Editor => Ok(Outcome::System(self.show_editor())),
            Command::Council(query) => self.propose_council(&query).await,
            Command::Seat(model) => self.handle_seat(model),
            Command::CouncilYes => self.dispatch_council().await,
            Command::CouncilNo => Ok(self.drop_pending(Slot::Council, "Council request dropped.")),
            Command::LoadYes => self.approve_ref_load().await,
            Command::LoadNo => Ok(self.drop_pending(Slot::RefLoad, "Reference load declined.")),
            Command::ConfirmYes => self.dispatch_generic().await,
            Command::ConfirmNo => Ok(self.drop_pending(Slot::Generic, "Cancelled.")),
            Command::Unknown(cmd) => Ok(Outcome::line(format!(
                "Unknown command: /{cmd}. Try /help."
            ))),
        }
    }

    async fn save_preferences(&self) -> Result<Outcome, Error> {
        self.store
            .set_preference(pref::LAST_MODE, self.state.mode.as_str())
            .await?;
        self.store
            .set_preference(pref::LAST_LENS, self.state.lens.as_str())
            .await?;
        self.store
            .set_preference(pref::INITIATIVE_DEFAULT, self.state.initiative.as_str())
            .await?;
        self.store
            .set_preference(pref::LAST_MODEL, &self.model)
            .await?;
        self.store
            .set_preference(pref::LAST_PROFILE, &self.profile_name)
            .await?;
        Ok(Outcome::line("Session preferences saved."))
    }

    async fn weave_bookmark(&self, name: Option<&str>) -> Result<Outcome, Error> {
        if self.history.is_empty() {
            return Ok(Outcome::line("Nothing to bookmark yet."));
        }
        let woven = bookmark::weave(
            &self.bookmarks_dir,
            name,
            &self.history,
            &self.last_search_query,
            &self.last_search_results,
        )?;
        self.store
            .log_event_best_effort(
                &self.session_id,
                EventKind::BookmarkCreated,
                json!({ "filename": woven.filename, "sha256": woven.sha256 }),
            )
            .await;
        Ok(Outcome::line(format!("Bookmark woven: {}", woven.filename)))
    }

    async fn show_session(&self) -> Result<Outcome, Error> {
        let mut lines = vec![format!("Session {}", self.session_id)];
        if let Some(session) = self.store.get_session(&self.session_id).await? {
            lines.push(format!("  name: {}", session.display_name()));
            lines.push(format!("  exchanges: {}", session.message_count));
            lines.push(format!(
                "  created: {}",
                session.created_at.format("%Y-%m-%d %H:%M")
            ));
        }
        lines.push(format!("  model: {}", self.model));
        lines.push(format!("  profile: {}", self.profile_name));
        lines.push(format!("  mode: {}", self.state.mode.as_str()));
        lines.push(format!("  lens: {}", self.state.lens.as_str()));
        Ok(Outcome::System(lines))
    }

    fn show_context(&self) -> Vec<String> {
        let assessment = self.accountant.estimate(
            self.history.iter().map(|m| m.content.as_str()),
            std::iter::empty(),
        );
        vec![
            format!(
                "Context load: {} ({} tokens of {})",
                assessment.display(),
                assessment.total_tokens,
                self.accountant.window()
            ),
            format!("Search gate: {}", gate_line(&self.state.search_gate)),
            format!("Council gate: {}", gate_line(&self.state.council_gate)),
            format!("Working memory: {} messages", self.history.len()),
        ]
    }

    async fn show_models(&self) -> Result<Outcome, Error> {
        let models = self.client.list_models().await.map_err(Error::Provider)?;
        if models.is_empty() {
            return Ok(Outcome::line("No models reported by the backend."));
        }
        let mut lines = vec!["Available models:".to_string()];
        for m in models {
            let marker = if m.name == self.model { " *" } else { "" };
            match m.size {
                Some(bytes) => lines.push(format!(
                    "  {}{marker} ({:.1} GB)",
                    m.name,
                    bytes as f64 / 1e9
                )),
                None => lines.push(format!("  {}{marker}", m.name)),
            }
        }
        Ok(Outcome::System(lines))
    }

    fn show_profiles(&self) -> Vec<String> {
        let available = Profile::available(&self.profiles_dir);
        if available.is_empty() {
            return vec![format!(
                "No profiles found; using built-in '{}'.",
                self.profile_name
            )];
        }
        let mut lines = vec!["Profiles:".to_string()];
        for name in available {
            let marker = if name == self.profile_name { " *" } else { "" };
            lines.push(format!("  {name}{marker}"));
        }
        lines
    }

    fn show_monitor(&self) -> Vec<String> {
        let mut lines = Vec::new();
        match self.last_stats {
            Some(stats) => {
                lines.push(format!("Last turn: {} ms", stats.latency_ms));
                lines.push(format!("  ~{} tokens", stats.tokens_estimate));
                if let Some(tps) = stats.tokens_per_sec {
                    lines.push(format!("  {tps:.1} tok/s"));
                }
            }
            None => lines.push("No turns generated yet.".to_string()),
        }
        lines.push(format!("Band: {}", self.state.context_band.as_str()));
        lines.push(format!("Search gate: {}", gate_line(&self.state.search_gate)));
        lines.push(format!("Council gate: {}", gate_line(&self.state.council_gate)));
        lines
    }

    fn show_editor(&self) -> Vec<String> {
        match &self.active_file {
            Some((path, content)) => {
                let mut lines = vec![format!("Active file: {path}")];
                for line in content.lines().take(20) {
                    lines.push(format!("  {line}"));
                }
                if content.lines().count() > 20 {
                    lines.push("  ...".to_string());
                }
                lines
            }
            None => vec!["No file loaded. Reference one with @path and a load verb.".to_string()],
        }
    }

    // --- council flow ---

    async fn propose_council(&mut self, query: &str) -> Result<Outcome, Error> {
        let Some(seat) = &self.council else {
            return Ok(Outcome::line(
                "No council seat configured. Set one up and retry.",
            ));
        };
        if query.is_empty() {
            return Ok(Outcome::line("Usage: /council <question>"));
        }

        let request_type = RequestType::classify(query);
        let input = BriefInput {
            mode: self.state.mode.as_str(),
            lens: self.state.lens.as_str(),
            context_band: self.state.context_band.as_str(),
            recent_turns: &self.history,
            user_query: query,
            request_type,
            active_file: self
                .active_file
                .as_ref()
                .map(|(p, c)| (p.as_str(), c.as_str())),
            node_assessment: None,
        };
        let (brief, meta) = prepare_brief(&input);

        self.store
            .log_event_best_effort(
                &self.session_id,
                EventKind::CouncilRequested,
                json!({
                    "model": seat.model(),
                    "request_type": request_type.as_str(),
                    "redactions": meta.redactions,
                }),
            )
            .await;

        let preview = sovwren_session::brief::preview(&brief).to_string();
        self.broker.propose(
            ConsentKind::Council,
            json!({ "brief": brief, "query": query }),
            preview.clone(),
        );

        Ok(Outcome::System(vec![
            format!("Council brief prepared for {}:", seat.model()),
            preview,
            meta.summary(),
            "Dispatch with /council-yes or drop with /council-no (expires in 60s).".to_string(),
        ]))
    }

    async fn dispatch_council(&mut self) -> Result<Outcome, Error> {
        let pending = match self.broker.resolve(Slot::Council, true) {
            Ok(p) => p,
            Err(e) => return Ok(consent_miss(e)),
        };
        let Some(seat) = &self.council else {
            return Ok(Outcome::line("No council seat configured."));
        };
        let brief = pending
            .payload
            .get("brief")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        self.store
            .log_event_best_effort(
                &self.session_id,
                EventKind::ConsentCheckpoint,
                json!({ "kind": pending.kind.as_str(), "approved": true }),
            )
            .await;

        info!(model = seat.model(), "dispatching council brief");
        let response = seat.consult(&brief).await.map_err(Error::Provider)?;

        // Council voices sit in working memory under their own role so
        // they are never replayed to the local model as its own words.
        self.history.push(ChatMessage::council(&response));
        trim_history(&mut self.history);

        Ok(Outcome::System(vec![
            format!("Council ({}):", seat.model()),
            response,
        ]))
    }

    fn handle_seat(&mut self, model: Option<String>) -> Result<Outcome, Error> {
        match (&mut self.council, model) {
            (Some(seat), Some(model)) => {
                seat.seat(&model);
                self.state.council_gate = GateState::Open(model.clone());
                Ok(Outcome::line(format!("Council seat moved to {model}.")))
            }
            (Some(seat), None) => Ok(Outcome::line(format!(
                "Council seat: {} via {}",
                seat.model(),
                seat.backend_name()
            ))),
            (None, _) => Ok(Outcome::line("No council seat configured.")),
        }
    }

    // --- ref-load and generic confirms ---

    async fn approve_ref_load(&mut self) -> Result<Outcome, Error> {
        let pending = match self.broker.resolve(Slot::RefLoad, true) {
            Ok(p) => p,
            Err(e) => return Ok(consent_miss(e)),
        };
        self.store
            .log_event_best_effort(
                &self.session_id,
                EventKind::ConsentCheckpoint,
                json!({ "kind": pending.kind.as_str(), "approved": true }),
            )
            .await;

        let refs: Vec<String> = pending
            .payload
            .get("refs")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        let message = pending
            .payload
            .get("message")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let mut notices = Vec::new();
        self.load_refs(&refs, &mut notices).await;
        // Resend the held message exactly once, with the slot consumed.
        self.run_turn(&message, notices).await
    }

    async fn dispatch_generic(&mut self) -> Result<Outcome, Error> {
        let pending = match self.broker.resolve(Slot::Generic, true) {
            Ok(p) => p,
            Err(e) => return Ok(consent_miss(e)),
        };
        self.store
            .log_event_best_effort(
                &self.session_id,
                EventKind::ConsentCheckpoint,
                json!({ "kind": pending.kind.as_str(), "approved": true }),
            )
            .await;
        self.execute_generic(pending).await
    }

    async fn execute_generic(&mut self, pending: Pending) -> Result<Outcome, Error> {
        match pending.kind {
            ConsentKind::DeleteSession => {
                let id = pending
                    .payload
                    .get("id")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                self.store.delete_session(&id).await?;
                if id == self.session_id {
                    self.start_fresh_session().await?;
                    return Ok(Outcome::line(format!(
                        "Session deleted. Started fresh session {}.",
                        self.session_id
                    )));
                }
                Ok(Outcome::line("Session deleted."))
            }
            ConsentKind::DeleteAllSessions => {
                let removed = self.store.delete_all_sessions().await?;
                self.start_fresh_session().await?;
                Ok(Outcome::line(format!(
                    "Deleted {removed} sessions. Started fresh session {}.",
                    self.session_id
                )))
            }
            other => Ok(Outcome::line(format!(
                "Nothing to dispatch for '{}'.",
                other.as_str()
            ))),
        }
    }

    async fn start_fresh_session(&mut self) -> Result<(), Error> {
        self.session_id = new_session_id();
        self.message_count = 0;
        self.history.clear();
        self.store
            .create_session(&self.session_id, Some(&self.model))
            .await?;
        self.store
            .set_preference(pref::LAST_SESSION_ID, &self.session_id)
            .await?;
        Ok(())
    }

    fn drop_pending(&mut self, slot: Slot, message: &str) -> Outcome {
        match self.broker.resolve(slot, false) {
            Ok(_) | Err(ConsentError::Declined) => Outcome::line(message),
            Err(e) => consent_miss(e),
        }
    }
}

fn consent_miss(e: ConsentError) -> Outcome {
    match e {
        ConsentError::NothingPending(slot) => {
            Outcome::line(format!("Nothing pending for {slot}."))
        }
        ConsentError::Expired { timeout_secs } => Outcome::line(format!(
            "That confirmation expired ({timeout_secs}s window). Ask again."
        )),
        ConsentError::Declined => Outcome::line("Declined."),
    }
}

fn trim_history(history: &mut Vec<ChatMessage>) {
    let max = MAX_RAM_EXCHANGES * 2;
    if history.len() > max {
        history.drain(..history.len() - max);
    }
}

fn new_session_id() -> String {
    format!(
        "session-{}",
        chrono::Utc::now().format("%Y%m%d-%H%M%S%.3f")
    )
}

fn gate_state(search: &SearchGate) -> GateState {
    search.state().clone()
}

fn gate_line(state: &GateState) -> String {
    match state {
        GateState::Open(who) => format!("open ({who})"),
        GateState::Closed => "closed".to_string(),
    }
}

fn plural(n: usize, noun: &str) -> String {
    if n == 1 {
        format!("1 {noun}")
    } else {
        format!("{n} {noun}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sovwren_core::client::{GenerateResponse, ModelInfo};
    use sovwren_core::{Initiative, ProviderError};
    use std::sync::Mutex;

    struct ScriptedClient {
        replies: Mutex<Vec<String>>,
        requests: Mutex<Vec<GenerateRequest>>,
    }

    impl ScriptedClient {
        fn new(replies: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.iter().rev().map(|s| s.to_string()).collect()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn last_request(&self) -> GenerateRequest {
            self.requests
                .lock()
                .unwrap()
                .last()
                .cloned()
                .expect("no request recorded")
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn generate(
            &self,
            request: GenerateRequest,
        ) -> Result<GenerateResponse, ProviderError> {
            self.requests.lock().unwrap().push(request);
            let content = self
                .replies
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| "ok".to_string());
            Ok(GenerateResponse {
                text: content,
                model: "test-model".to_string(),
                usage: None,
            })
        }

        async fn list_models(&self) -> Result<Vec<ModelInfo>, ProviderError> {
            Ok(vec![ModelInfo::named("test-model")])
        }
    }

    async fn orchestrator(client: Arc<ScriptedClient>, dir: &std::path::Path) -> Orchestrator {
        let store = Arc::new(Store::new("sqlite::memory:").await.unwrap());
        Orchestrator::new(OrchestratorOptions {
            store,
            client,
            council: None,
            search: SearchGate::new(3),
            retriever: None,
            memory: MemoryStore::new(dir.join("memory.json")),
            profile: Profile::builtin(),
            profile_name: "default".to_string(),
            model: "test-model".to_string(),
            assistant_name: "Node".to_string(),
            confirmation_ttl: Duration::from_secs(60),
            auto_load_refs: false,
            workspace_dir: dir.to_path_buf(),
            bookmarks_dir: dir.join("bookmarks"),
            profiles_dir: dir.join("profiles"),
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn plain_message_generates_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let client = ScriptedClient::new(&["hello there"]);
        let mut orch = orchestrator(client.clone(), dir.path()).await;

        let outcome = orch.handle_line("tell me about rust").await.unwrap();
        let Outcome::Reply(reply) = outcome else {
            panic!("expected a reply");
        };
        assert_eq!(reply.text, "hello there");
        assert!(!reply.reasoning_hidden);
        assert_eq!(orch.history.len(), 2);

        let session = orch
            .store
            .get_session(orch.session_id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.message_count, 1);
    }

    #[tokio::test]
    async fn message_count_tracks_persisted_exchanges() {
        let dir = tempfile::tempdir().unwrap();
        let client = ScriptedClient::new(&["one", "two", "three"]);
        let mut orch = orchestrator(client.clone(), dir.path()).await;

        orch.handle_line("first").await.unwrap();
        orch.handle_line("second").await.unwrap();
        orch.handle_line("third").await.unwrap();

        let turns = orch
            .store
            .get_session_turns(orch.session_id())
            .await
            .unwrap();
        let session = orch
            .store
            .get_session(orch.session_id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(turns.len(), 3);
        assert_eq!(session.message_count, turns.len() as i64);
        assert_eq!(session.first_message_preview.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn idle_threshold_dims_then_input_restores() {
        let dir = tempfile::tempdir().unwrap();
        let client = ScriptedClient::new(&[]);
        let mut orch = orchestrator(client, dir.path()).await;

        orch.toggle_idleness().await;
        assert!(orch.state().idleness);

        // Not past the threshold yet.
        assert!(!orch.poll_idle());
        assert!(!orch.state().idle_dim);

        orch.last_activity = Instant::now() - IDLE_THRESHOLD;
        assert!(orch.poll_idle());
        assert!(orch.state().idle_dim);
        assert_eq!(orch.state().effective_initiative(), Initiative::Low);
        // Edge fires once.
        assert!(!orch.poll_idle());

        // Steward activity lifts the dim.
        orch.handle_line("/help").await.unwrap();
        assert!(!orch.state().idle_dim);
    }

    #[tokio::test]
    async fn slash_commands_never_reach_the_model() {
        let dir = tempfile::tempdir().unwrap();
        let client = ScriptedClient::new(&[]);
        let mut orch = orchestrator(client.clone(), dir.path()).await;

        orch.handle_line("/help").await.unwrap();
        orch.handle_line("/context").await.unwrap();
        assert!(client.requests.lock().unwrap().is_empty());
        assert!(orch.history.is_empty());
    }

    #[tokio::test]
    async fn memory_prefix_skips_the_model() {
        let dir = tempfile::tempdir().unwrap();
        let client = ScriptedClient::new(&[]);
        let mut orch = orchestrator(client.clone(), dir.path()).await;

        let outcome = orch
            .handle_line("remember: my name is Ada")
            .await
            .unwrap();
        let Outcome::System(lines) = outcome else {
            panic!("expected system lines");
        };
        assert!(lines[0].contains("Ada"));
        assert!(client.requests.lock().unwrap().is_empty());

        let entities = orch.memory.all().unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].entity_type, "person");
    }

    #[tokio::test]
    async fn ref_load_requires_consent_then_resends_once() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "alpha beta").unwrap();
        let client = ScriptedClient::new(&["looked at it"]);
        let mut orch = orchestrator(client.clone(), dir.path()).await;

        let outcome = orch.handle_line("look at @notes.txt please").await.unwrap();
        assert!(matches!(outcome, Outcome::System(_)));
        assert!(client.requests.lock().unwrap().is_empty());

        let outcome = orch.handle_line("/load-yes").await.unwrap();
        let Outcome::Reply(reply) = outcome else {
            panic!("expected a reply after approval");
        };
        assert_eq!(reply.text, "looked at it");

        let request = client.last_request();
        let context = request.context.expect("context should carry the file");
        assert!(context.contains("alpha beta"));
        assert!(context.contains("Referenced files:"));

        // The injection is one-shot.
        assert!(orch.ref_injection.is_none());
    }

    #[tokio::test]
    async fn load_no_drops_the_pending_ref() {
        let dir = tempfile::tempdir().unwrap();
        let client = ScriptedClient::new(&[]);
        let mut orch = orchestrator(client.clone(), dir.path()).await;

        orch.handle_line("read @missing.txt").await.unwrap();
        orch.handle_line("/load-no").await.unwrap();

        let outcome = orch.handle_line("/load-yes").await.unwrap();
        let Outcome::System(lines) = outcome else {
            panic!("expected system lines");
        };
        assert!(lines[0].contains("Nothing pending"));
    }

    #[tokio::test]
    async fn reasoning_tags_hidden_from_display_kept_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        let client = ScriptedClient::new(&["<think>private</think>public answer"]);
        let mut orch = orchestrator(client.clone(), dir.path()).await;

        let Outcome::Reply(reply) = orch.handle_line("question").await.unwrap() else {
            panic!("expected a reply");
        };
        assert_eq!(reply.text, "public answer");
        assert!(reply.reasoning_hidden);
        assert!(orch.history[1].content.contains("private"));
    }

    #[tokio::test]
    async fn history_trims_to_ram_limit() {
        let dir = tempfile::tempdir().unwrap();
        let replies: Vec<String> = (0..15).map(|i| format!("reply {i}")).collect();
        let refs: Vec<&str> = replies.iter().map(|s| s.as_str()).collect();
        let client = ScriptedClient::new(&refs);
        let mut orch = orchestrator(client.clone(), dir.path()).await;

        for i in 0..15 {
            orch.handle_line(&format!("message number {i}")).await.unwrap();
        }
        assert_eq!(orch.history.len(), MAX_RAM_EXCHANGES * 2);
        // Oldest exchanges dropped, newest kept.
        assert!(orch.history.last().unwrap().content.contains("reply 14"));
    }

    #[tokio::test]
    async fn delete_current_session_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let client = ScriptedClient::new(&["ok"]);
        let mut orch = orchestrator(client.clone(), dir.path()).await;
        orch.handle_line("hello world message").await.unwrap();

        let old_id = orch.session_id().to_string();
        orch.request_delete_session(&old_id).await.unwrap();
        let outcome = orch.handle_line("/confirm-yes").await.unwrap();
        let Outcome::System(lines) = outcome else {
            panic!("expected system lines");
        };
        assert!(lines[0].contains("fresh session"));
        assert_ne!(orch.session_id(), old_id);
        assert!(orch.store.get_session(&old_id).await.unwrap().is_none());
        assert!(orch.history.is_empty());
    }

    #[tokio::test]
    async fn confirm_without_pending_reports_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let client = ScriptedClient::new(&[]);
        let mut orch = orchestrator(client, dir.path()).await;

        let Outcome::System(lines) = orch.handle_line("/confirm-yes").await.unwrap() else {
            panic!("expected system lines");
        };
        assert!(lines[0].contains("Nothing pending"));
    }

    #[tokio::test]
    async fn council_without_seat_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let client = ScriptedClient::new(&[]);
        let mut orch = orchestrator(client, dir.path()).await;

        let Outcome::System(lines) =
            orch.handle_line("/council why does this deadlock").await.unwrap()
        else {
            panic!("expected system lines");
        };
        assert!(lines[0].contains("No council seat"));
    }

    #[tokio::test]
    async fn greeting_skips_retrieval_and_search() {
        let dir = tempfile::tempdir().unwrap();
        let client = ScriptedClient::new(&["hey yourself"]);
        let mut orch = orchestrator(client.clone(), dir.path()).await;

        orch.handle_line("hey there").await.unwrap();
        let request = client.last_request();
        assert!(request.context.is_none());
    }
}
