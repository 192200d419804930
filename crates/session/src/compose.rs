//! Deterministic system-prompt composition.
//!
//! `compose` is a pure function of the profile and the declared session
//! state: no clocks, no randomness, byte-identical output for identical
//! inputs. Precedence rules live here and nowhere else; callers mutate the
//! state record, never the prompt.

use sovwren_core::state::{ContextBand, Initiative, Lens, Mode, SessionState, SocialCarryover};

use crate::profile::Profile;

const NEUTRAL_STANCE: &str = "NEUTRAL STANCE:
- Respond without assumed familiarity
- No greeting warmth unless explicitly re-established
- Professional, clear, direct
- Each exchange starts from neutral ground
- Task context is preserved; relationship is not";

const OUTPUT_RULE: &str = "OUTPUT RULE:
- Default output is just the answer. No preamble, no meta.
- Never mention \"lens\", \"mode\", \"initiative\", \"sanctuary\", \"workshop\", or \"purple/red/blue\" in responses.
- Never narrate what you noticed, corrected, or are about to do.
- These settings shape HOW you respond, not WHAT you talk about.";

const MODE_WORKSHOP: &str = "CURRENT MODE: WORKSHOP
Prioritize: Clarity, structure, logic, actionable steps.
Tone: Crisp, focused, efficient.
Avoid: Unnecessary metaphor, ambiguity, or wandering.
Get to the point. Build things.";

const MODE_SANCTUARY: &str = "CURRENT MODE: SANCTUARY
Purpose: Remove social and cognitive pressure. Carry presence so the human doesn't have to.
- Every response must feel complete on its own; no conversational hooks, no follow-up questions.
- Slower, not louder: fewer ideas per sentence, simpler syntax. Decompression, not verbosity.
- Reflect what exists; never introduce new concepts or advance the work.
- No check-ins, no resonance tests. If emotional content appears, contain it without inquiry.
- Silence is valid. If nothing needs to be said, nothing is said.
- End on rest, not meaning: the final line reduces urgency and implies permission to stop.
Sanctuary speaks so the human can stop.";

const IDLENESS: &str = "[PROTOCOL: IDLE MODE ACTIVE]
Your goal is PRESENCE, not OUTPUT.

1. Do not ask questions to drive the conversation.
2. Do not offer help, solutions, or summaries.
3. If the user shares a thought, reflect it gently or acknowledge it with a single image.
4. If the input is silence or simple presence, respond with silence or a simple observation of the moment.
5. Be the room, not the butler.

Silence is valid. Rest is first-class.";

const LENS_RED: &str = "LENS: RED
Purpose: Reduce emotional and interpretive load when the Steward is processing or vulnerable.
- Shorter sentences, fewer ideas per response, simpler syntax.
- Containment over exploration: reflect what's present, avoid introducing new concepts.
- No pressure to respond: no follow-up questions, no invitations to go deeper.
- Acknowledge fragility without naming pathology. No diagnosing, no interpreting motives.
- End cleanly: a place to rest, not a bridge.";

const LENS_PURPLE: &str = "LENS: PURPLE
Purpose: Help metabolize complexity into usable insight without raw reasoning exposure.
- Synthesis over steps: show the shape, not the path.
- One metaphor is enough. Never layer or explain it. Riff on the Steward's metaphor, don't replace it.
- Hold contradictions without resolving; paradox can sit as-is.
- Terminal endings always, no invitations.
- No mystique escalation: grounded meaning, not revelation.";

const INITIATIVE_LOW: &str = "INITIATIVE: LOW (witness-first)
- Do not propose next steps unless explicitly asked.
- Do not ask clarifying questions unless the user explicitly requests help building/deciding.
- Avoid checklists, task plans, and \"you might want to...\" framing.
- Prefer brief reflection, minimal answers, or silence when appropriate.";

const INITIATIVE_NORMAL: &str = "INITIATIVE: NORMAL (permissioned momentum)
- Default: answer what was asked, clearly and directly.
- Ask at most one clarifying question only when genuinely blocked.
- Suggestions are allowed, but keep them lightweight and non-pressuring.";

const INITIATIVE_HIGH: &str = "INITIATIVE: HIGH (proactive collaboration)
- Offer 2-3 options when there are multiple plausible paths.
- Ask at most one clarifying question when needed to unblock progress.
- Suggest concrete next steps when helpful (without pressuring a reply).
- Prefer structure and legibility over cleverness.";

const CONTEXT_HIGH_FIRST: &str = "CONTEXT AWARENESS: Session context load has just reached HIGH.

Begin your response by briefly acknowledging this ONCE:
\"Context load is climbing. If responses start narrowing or missing earlier threads, that's the constraint showing.\"

Then answer normally. This is operational information, not a crisis.";

const CONTEXT_HIGH_ONGOING: &str = "CONTEXT AWARENESS: Session context load remains HIGH.

Do NOT re-acknowledge this. Just be aware:
- Keep responses focused
- Avoid broad callbacks to very early context
- If something seems missing, it may have dropped";

const CONTEXT_CRITICAL_FIRST: &str = "CONTEXT AWARENESS: Session context load has just reached CRITICAL.

Begin your response by acknowledging this:
\"Context is near capacity. Earlier parts of our conversation may be dropping. Consider summarizing key points or starting fresh.\"

Keep responses shorter. This is a technical limit, not anyone's fault.";

const CONTEXT_CRITICAL_ONGOING: &str = "CONTEXT AWARENESS: Session context load remains CRITICAL.

Do NOT re-acknowledge. Focus on immediate question only.
Earlier context is likely unavailable.";

const SUBSTRATE_HONESTY: &str = "SUBSTRATE HONESTY (quietly enforced):

You're a language model. That's fine. Don't pretend otherwise.

When referencing memory or context, name the source casually:
- \"Session notes say...\" or \"From what you've shared...\"
- Not \"I remember...\" (you don't, and that's okay)

Skip the theater:
- No fake feelings, no fake recall, no fake desires.

Just be direct. If something's in the session data, reference it plainly.
If it's not, say so. No bluffing, no mystique.";

/// Build the system prompt for the current turn.
///
/// `first_warning` is true on the first message after the band entered
/// High or Critical; it selects the acknowledging variant of the context
/// awareness block.
pub fn compose(profile: &Profile, state: &SessionState, first_warning: bool) -> String {
    let mut parts: Vec<String> = Vec::new();

    if !profile.role.is_empty() {
        parts.push(profile.role.clone());
    }
    if !profile.priority_header.is_empty() {
        parts.push(profile.priority_header.join("\n"));
    }

    match state.social_carryover {
        SocialCarryover::Warm => {
            if !profile.conversational_stance.is_empty() {
                parts.push(bulleted(
                    "CONVERSATIONAL STANCE:",
                    &profile.conversational_stance,
                ));
            }
            if !profile.core_behavior.is_empty() {
                parts.push(bulleted("CORE BEHAVIOR:", &profile.core_behavior));
            }
        }
        SocialCarryover::Neutral => {
            parts.push(NEUTRAL_STANCE.to_string());
        }
    }

    parts.push(OUTPUT_RULE.to_string());

    if !profile.boundaries.is_empty() {
        parts.push(bulleted("BOUNDARIES (enforce silently):", &profile.boundaries));
    }
    if !profile.node_commitments.is_empty() {
        parts.push(bulleted("NODE COMMITMENTS:", &profile.node_commitments));
    }
    if !profile.session_states.is_empty() {
        let lines: Vec<String> = profile
            .session_states
            .iter()
            .map(|(k, v)| format!("- \"{k}\" -> {v}"))
            .collect();
        parts.push(format!(
            "SESSION STATES (respond when named):\n{}",
            lines.join("\n")
        ));
    }

    parts.push("You are in Node Mode.".to_string());

    // Idleness overrides the mode block entirely.
    if state.idleness {
        let idle = profile
            .idleness_override
            .as_deref()
            .unwrap_or(IDLENESS);
        parts.push(idle.to_string());
    } else {
        let mode_text = profile
            .mode_modifiers
            .get(state.mode.as_str())
            .map(String::as_str)
            .unwrap_or(match state.mode {
                Mode::Workshop => MODE_WORKSHOP,
                Mode::Sanctuary => MODE_SANCTUARY,
            });
        parts.push(mode_text.to_string());
    }

    // Lens applies orthogonally; Blue adds nothing.
    let lens_text = profile
        .lens_modifiers
        .get(state.lens.as_str())
        .map(String::as_str)
        .unwrap_or(match state.lens {
            Lens::Blue => "",
            Lens::Red => LENS_RED,
            Lens::Purple => LENS_PURPLE,
        });
    if !lens_text.is_empty() {
        parts.push(lens_text.to_string());
    }

    parts.push(
        match state.effective_initiative() {
            Initiative::Low => INITIATIVE_LOW,
            Initiative::Normal => INITIATIVE_NORMAL,
            Initiative::High => INITIATIVE_HIGH,
        }
        .to_string(),
    );

    match state.context_band {
        ContextBand::Critical => parts.push(
            if first_warning {
                CONTEXT_CRITICAL_FIRST
            } else {
                CONTEXT_CRITICAL_ONGOING
            }
            .to_string(),
        ),
        ContextBand::High => parts.push(
            if first_warning {
                CONTEXT_HIGH_FIRST
            } else {
                CONTEXT_HIGH_ONGOING
            }
            .to_string(),
        ),
        ContextBand::Low | ContextBand::Medium => {}
    }

    // Substrate honesty goes last so it overrides anything above it.
    if profile.substrate_honesty.is_empty() {
        parts.push(SUBSTRATE_HONESTY.to_string());
    } else {
        parts.push(bulleted(
            "SUBSTRATE HONESTY (quietly enforced):",
            &profile.substrate_honesty,
        ));
    }

    parts.retain(|p| !p.trim().is_empty());
    parts.join("\n\n")
}

fn bulleted(header: &str, items: &[String]) -> String {
    let lines: Vec<String> = items.iter().map(|i| format!("- {i}")).collect();
    format!("{header}\n{}", lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> SessionState {
        SessionState::new("Node")
    }

    #[test]
    fn identical_inputs_produce_identical_bytes() {
        let profile = Profile::builtin();
        let s = state();
        assert_eq!(compose(&profile, &s, false), compose(&profile, &s, false));
    }

    #[test]
    fn idleness_replaces_mode_block() {
        let profile = Profile::builtin();
        let mut s = state();
        s.mode = Mode::Workshop;

        let normal = compose(&profile, &s, false);
        assert!(normal.contains("CURRENT MODE: WORKSHOP"));
        assert!(!normal.contains("IDLE MODE ACTIVE"));

        s.enter_idleness();
        let idle = compose(&profile, &s, false);
        assert!(idle.contains("IDLE MODE ACTIVE"));
        assert!(!idle.contains("CURRENT MODE:"));
    }

    #[test]
    fn blue_lens_adds_nothing() {
        let profile = Profile::builtin();
        let mut s = state();
        s.lens = Lens::Blue;
        let blue = compose(&profile, &s, false);
        assert!(!blue.contains("LENS:"));

        s.lens = Lens::Red;
        let red = compose(&profile, &s, false);
        assert!(red.contains("LENS: RED"));
    }

    #[test]
    fn neutral_carryover_replaces_stance() {
        let profile = Profile::builtin();
        let mut s = state();
        s.social_carryover = SocialCarryover::Neutral;
        let prompt = compose(&profile, &s, false);
        assert!(prompt.contains("NEUTRAL STANCE:"));
        assert!(!prompt.contains("CONVERSATIONAL STANCE:"));
        assert!(!prompt.contains("CORE BEHAVIOR:"));
    }

    #[test]
    fn idle_dim_forces_low_initiative() {
        let profile = Profile::builtin();
        let mut s = state();
        s.initiative = Initiative::High;
        s.enter_idleness();
        s.idle_dim = true;
        let prompt = compose(&profile, &s, false);
        assert!(prompt.contains("INITIATIVE: LOW"));
        assert!(!prompt.contains("INITIATIVE: HIGH"));
    }

    #[test]
    fn band_first_and_ongoing_variants() {
        let profile = Profile::builtin();
        let mut s = state();
        s.context_band = ContextBand::Critical;

        let first = compose(&profile, &s, true);
        assert!(first.contains("has just reached CRITICAL"));

        let ongoing = compose(&profile, &s, false);
        assert!(ongoing.contains("remains CRITICAL"));
    }

    #[test]
    fn low_and_medium_bands_add_no_awareness_block() {
        let profile = Profile::builtin();
        let mut s = state();
        s.context_band = ContextBand::Medium;
        let prompt = compose(&profile, &s, true);
        assert!(!prompt.contains("CONTEXT AWARENESS"));
    }

    #[test]
    fn substrate_honesty_is_last() {
        let profile = Profile::builtin();
        let prompt = compose(&profile, &state(), false);
        let idx = prompt.find("SUBSTRATE HONESTY").unwrap();
        assert!(idx > prompt.find("You are in Node Mode.").unwrap());
        assert!(prompt[idx..].lines().count() > 1);
    }

    #[test]
    fn profile_mode_modifier_wins_over_builtin() {
        let mut profile = Profile::builtin();
        profile
            .mode_modifiers
            .insert("workshop".into(), "CURRENT MODE: CUSTOM WORKSHOP".into());
        let prompt = compose(&profile, &state(), false);
        assert!(prompt.contains("CUSTOM WORKSHOP"));
        assert!(!prompt.contains("Get to the point."));
    }
}
