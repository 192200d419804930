//! Approximate context-load accounting.
//!
//! Estimates only. The backend's tokenizer is the authority; this module
//! exists so the Steward can see the load climbing before responses start
//! degrading. Every displayed figure carries a `~` marker.

use sovwren_core::state::ContextBand;
use tracing::debug;

pub const SYS_BASELINE: u64 = 800;

const DEFAULT_CONTEXT_WINDOW: u64 = 32768;

/// Practical lookup, not exhaustive. Matched by substring against the
/// lowercased model name; first hit wins.
const MODEL_CONTEXT_WINDOWS: &[(&str, u64)] = &[
    ("ministral-3b", 32768),
    ("ministral-8b", 32768),
    ("mistral-7b", 8192),
    ("mistral-nemo", 128000),
    ("llama-3.2", 128000),
    ("llama-3.1", 128000),
    ("llama-3", 8192),
    ("llama-2", 4096),
    ("qwen2.5", 32768),
    ("qwen2", 32768),
    ("qwen-coder", 32768),
    ("deepseek-r1", 64000),
    ("deepseek-coder", 16384),
    ("phi-3", 128000),
    ("phi-4", 16384),
    ("gemma-2", 8192),
    ("gemma", 8192),
    ("codellama", 16384),
];

/// Rough estimate: 4 chars per token, rounded up.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}

/// Context window for a model name, by substring match with a default.
pub fn context_window(model: &str) -> u64 {
    let lowered = model.to_lowercase();
    MODEL_CONTEXT_WINDOWS
        .iter()
        .find(|(key, _)| lowered.contains(key))
        .map(|(_, window)| *window)
        .unwrap_or(DEFAULT_CONTEXT_WINDOW)
}

fn band_for(ratio: f64) -> ContextBand {
    if ratio < 0.40 {
        ContextBand::Low
    } else if ratio < 0.70 {
        ContextBand::Medium
    } else if ratio < 0.85 {
        ContextBand::High
    } else {
        ContextBand::Critical
    }
}

/// One turn's context assessment.
#[derive(Debug, Clone)]
pub struct Assessment {
    pub total_tokens: u64,
    pub ratio: f64,
    pub band: ContextBand,
    /// Set when the band's severity changed since the previous turn.
    pub transition: Option<(ContextBand, ContextBand)>,
}

impl Assessment {
    pub fn percent(&self) -> u32 {
        (self.ratio * 100.0) as u32
    }

    /// Display form with the approximation marker, e.g. `~High (72%)`.
    pub fn display(&self) -> String {
        format!("~{} ({}%)", self.band.as_str(), self.percent())
    }
}

/// Tracks band state across a session: the previous band for transition
/// detection and which warning levels the Node has already acknowledged.
#[derive(Debug)]
pub struct ContextAccountant {
    window: u64,
    previous_band: ContextBand,
    high_acknowledged: bool,
    critical_acknowledged: bool,
}

impl ContextAccountant {
    pub fn new(model: &str) -> Self {
        Self {
            window: context_window(model),
            previous_band: ContextBand::Low,
            high_acknowledged: false,
            critical_acknowledged: false,
        }
    }

    /// Re-point the accountant at a different model's window.
    pub fn set_model(&mut self, model: &str) {
        self.window = context_window(model);
    }

    pub fn window(&self) -> u64 {
        self.window
    }

    pub fn band(&self) -> ContextBand {
        self.previous_band
    }

    /// Measure the load without advancing band tracking. Display paths
    /// use this; the turn pipeline owns `assess`.
    pub fn estimate<'a, H, C>(&self, history: H, chunks: C) -> Assessment
    where
        H: IntoIterator<Item = &'a str>,
        C: IntoIterator<Item = &'a str>,
    {
        let total = self.tally(history, chunks);
        let ratio = total as f64 / self.window as f64;
        Assessment {
            total_tokens: total,
            ratio,
            band: band_for(ratio),
            transition: None,
        }
    }

    fn tally<'a, H, C>(&self, history: H, chunks: C) -> u64
    where
        H: IntoIterator<Item = &'a str>,
        C: IntoIterator<Item = &'a str>,
    {
        let mut total = SYS_BASELINE;
        for text in history {
            total += estimate_tokens(text);
        }
        for text in chunks {
            total += estimate_tokens(text);
        }
        total
    }

    /// Recompute the load from the current history and loaded chunks.
    pub fn assess<'a, H, C>(&mut self, history: H, chunks: C) -> Assessment
    where
        H: IntoIterator<Item = &'a str>,
        C: IntoIterator<Item = &'a str>,
    {
        let total = self.tally(history, chunks);
        let ratio = total as f64 / self.window as f64;
        let band = band_for(ratio);

        let transition = if band != self.previous_band {
            let from = self.previous_band;
            debug!(from = from.as_str(), to = band.as_str(), ratio, "context band transition");
            Some((from, band))
        } else {
            None
        };
        self.previous_band = band;

        Assessment {
            total_tokens: total,
            ratio,
            band,
            transition,
        }
    }

    /// Whether the composer should use the first-entry awareness variant
    /// for the given band.
    pub fn first_warning(&self, band: ContextBand) -> bool {
        match band {
            ContextBand::High => !self.high_acknowledged,
            ContextBand::Critical => !self.critical_acknowledged,
            _ => false,
        }
    }

    /// Record that this turn's response carried the band acknowledgement.
    /// Critical acknowledgement implies High.
    pub fn acknowledge(&mut self, band: ContextBand) {
        match band {
            ContextBand::Critical => {
                self.critical_acknowledged = true;
                self.high_acknowledged = true;
            }
            ContextBand::High => {
                self.high_acknowledged = true;
            }
            _ => {}
        }
    }
}
