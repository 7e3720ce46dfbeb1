use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Which collaborator an event is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Producer,
    Critic,
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentRole::Producer => write!(f, "producer"),
            AgentRole::Critic => write!(f, "critic"),
        }
    }
}

/// Structured log events for the refinement loop
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LogEvent {
    LoopStarted {
        prompt: String,
        output_dir: PathBuf,
        max_iterations: usize,
        threshold: f64,
    },
    GenerationStarted {
        iteration: usize,
        prompt_preview: String,
    },
    ArtifactSaved {
        iteration: usize,
        path: PathBuf,
        duration_secs: f64,
    },
    CritiqueStarted {
        iteration: usize,
    },
    CritiqueCompleted {
        iteration: usize,
        scores: String,
        aggregate: f64,
        threshold: f64,
        duration_secs: f64,
    },
    RetryScheduled {
        iteration: usize,
        role: AgentRole,
        attempt: u32,
        delay_secs: f64,
        error: String,
    },
    ErrorEncountered {
        iteration: usize,
        role: AgentRole,
        error: String,
    },
    ThresholdMet {
        iterations: usize,
        score: f64,
        duration_secs: f64,
    },
    MaxIterationsReached {
        iterations: usize,
        last_score: Option<f64>,
    },
}

impl LogEvent {
    /// Add a timestamp to serialize with the event
    fn with_timestamp(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(obj) = value.as_object_mut() {
            obj.insert(
                "timestamp".to_string(),
                serde_json::Value::String(chrono::Utc::now().to_rfc3339()),
            );
        }
        value
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format with colors and visual structure
    #[default]
    Pretty,
    /// JSON lines format for machine consumption
    Json,
    /// Compact single-line format
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            _ => Err(format!("Unknown log format: {}", s)),
        }
    }
}

/// Logger for loop events - handles both console output and file logging
pub struct Logger {
    format: LogFormat,
    file_writer: Option<Mutex<File>>,
}

impl Logger {
    pub fn new(format: LogFormat) -> Self {
        Self {
            format,
            file_writer: None,
        }
    }

    /// Create a logger with file output in addition to console
    pub fn with_file(format: LogFormat, log_path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        Ok(Self {
            format,
            file_writer: Some(Mutex::new(file)),
        })
    }

    pub fn log(&self, event: &LogEvent) {
        // File output is always JSON
        if let Some(ref writer) = self.file_writer {
            if let Ok(mut file) = writer.lock() {
                let json = event.with_timestamp();
                let _ = writeln!(file, "{}", json);
            }
        }

        match self.format {
            LogFormat::Json => self.log_json(event),
            LogFormat::Pretty => self.log_pretty(event),
            LogFormat::Compact => self.log_compact(event),
        }
    }

    fn log_json(&self, event: &LogEvent) {
        if let Ok(json) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{}", json);
        }
    }

    fn log_pretty(&self, event: &LogEvent) {
        let mut stderr = std::io::stderr();
        match event {
            LogEvent::LoopStarted {
                prompt,
                output_dir,
                max_iterations,
                threshold,
            } => {
                let _ = writeln!(stderr);
                let _ = writeln!(
                    stderr,
                    "{}",
                    "╭─────────────────────────────────────────────────────────────────────╮"
                        .bright_blue()
                );
                let _ = writeln!(
                    stderr,
                    "{}  {}{}",
                    "│".bright_blue(),
                    "imageloops".bold().bright_white(),
                    " ".repeat(57) + &"│".bright_blue().to_string()
                );
                let _ = writeln!(
                    stderr,
                    "{}  {} {}",
                    "│".bright_blue(),
                    "Prompt:".dimmed(),
                    Self::truncate_with_padding(prompt, 60, 68).dimmed()
                );
                let _ = writeln!(
                    stderr,
                    "{}  {} {}",
                    "│".bright_blue(),
                    "Out:".dimmed(),
                    Self::truncate_with_padding(&output_dir.display().to_string(), 63, 68)
                        .dimmed()
                );
                let limits = format!("max {} iterations, score > {}", max_iterations, threshold);
                let _ = writeln!(
                    stderr,
                    "{}  {} {}",
                    "│".bright_blue(),
                    "Goal:".dimmed(),
                    Self::truncate_with_padding(&limits, 62, 68).dimmed()
                );
                let _ = writeln!(
                    stderr,
                    "{}",
                    "╰─────────────────────────────────────────────────────────────────────╯"
                        .bright_blue()
                );
                let _ = writeln!(stderr);
            }
            LogEvent::GenerationStarted {
                iteration,
                prompt_preview,
            } => {
                let iter_text = format!("─ Iteration {} ", iteration + 1);
                let padding = "─".repeat(67usize.saturating_sub(iter_text.chars().count()));
                let _ = writeln!(
                    stderr,
                    "{}{}{}",
                    "┌".bright_blue(),
                    iter_text.bright_blue().bold(),
                    padding.bright_blue()
                );
                let _ = writeln!(stderr);
                let _ = writeln!(
                    stderr,
                    "  {} {}",
                    "▶".bright_cyan(),
                    "GENERATE".bright_cyan().bold()
                );
                let _ = writeln!(stderr, "    {} {}", "│".dimmed(), prompt_preview.dimmed());
            }
            LogEvent::ArtifactSaved {
                path,
                duration_secs,
                ..
            } => {
                let _ = writeln!(
                    stderr,
                    "    {} Saved {} ({:.1}s)",
                    "✓".bright_green(),
                    path.display(),
                    duration_secs
                );
                let _ = writeln!(stderr);
            }
            LogEvent::CritiqueStarted { .. } => {
                let _ = writeln!(
                    stderr,
                    "  {} {}",
                    "▶".bright_magenta(),
                    "CRITIQUE".bright_magenta().bold()
                );
            }
            LogEvent::CritiqueCompleted {
                scores,
                aggregate,
                threshold,
                duration_secs,
                ..
            } => {
                let _ = writeln!(stderr, "    {} {}", "│".dimmed(), scores.dimmed());
                let verdict = format!(
                    "Score {:.2} (threshold {}) ({:.1}s)",
                    aggregate, threshold, duration_secs
                );
                let styled = if aggregate > threshold {
                    format!("✓ {}", verdict).bright_green().to_string()
                } else {
                    format!("→ {}", verdict).bright_yellow().to_string()
                };
                let _ = writeln!(stderr, "    {}", styled);
                let _ = writeln!(stderr);
                let _ = writeln!(
                    stderr,
                    "{}",
                    "└─────────────────────────────────────────────────────────────────────┘"
                        .bright_blue()
                );
                let _ = writeln!(stderr);
            }
            LogEvent::RetryScheduled {
                role,
                attempt,
                delay_secs,
                error,
                ..
            } => {
                let _ = writeln!(
                    stderr,
                    "    {} {} failed ({}), retry {} in {:.1}s",
                    "↻".bright_yellow(),
                    role,
                    error.dimmed(),
                    attempt,
                    delay_secs
                );
            }
            LogEvent::ErrorEncountered {
                iteration,
                role,
                error,
            } => {
                let _ = writeln!(stderr);
                let _ = writeln!(
                    stderr,
                    "{} {} error in iteration {}: {}",
                    "✗".bright_red(),
                    role,
                    iteration + 1,
                    error.bright_red()
                );
            }
            LogEvent::ThresholdMet { .. } => {
                // Final outcome is printed by the binary
            }
            LogEvent::MaxIterationsReached {
                iterations,
                last_score,
            } => {
                let _ = writeln!(stderr);
                let last = last_score
                    .map(|s| format!(", last score {:.2}", s))
                    .unwrap_or_default();
                let _ = writeln!(
                    stderr,
                    "{} Maximum iterations reached ({}{})",
                    "⚠".bright_yellow(),
                    iterations,
                    last
                );
            }
        }
    }

    fn log_compact(&self, event: &LogEvent) {
        let mut stderr = std::io::stderr();
        let timestamp = chrono::Utc::now().format("%H:%M:%S");
        let msg = match event {
            LogEvent::LoopStarted { .. } => format!("[{}] loop:start", timestamp),
            LogEvent::GenerationStarted { iteration, .. } => {
                format!("[{}] generate:start:{}", timestamp, iteration + 1)
            }
            LogEvent::ArtifactSaved {
                iteration,
                path,
                duration_secs,
            } => format!(
                "[{}] generate:done:{} {} {:.1}s",
                timestamp,
                iteration + 1,
                path.display(),
                duration_secs
            ),
            LogEvent::CritiqueStarted { iteration } => {
                format!("[{}] critique:start:{}", timestamp, iteration + 1)
            }
            LogEvent::CritiqueCompleted {
                iteration,
                aggregate,
                duration_secs,
                ..
            } => format!(
                "[{}] critique:done:{} score={:.2} {:.1}s",
                timestamp,
                iteration + 1,
                aggregate,
                duration_secs
            ),
            LogEvent::RetryScheduled {
                iteration,
                role,
                attempt,
                ..
            } => format!(
                "[{}] retry:{}:{} {}",
                timestamp,
                iteration + 1,
                role,
                attempt
            ),
            LogEvent::ErrorEncountered {
                iteration,
                role,
                error,
            } => format!("[{}] error:{}:{}:{}", timestamp, iteration + 1, role, error),
            LogEvent::ThresholdMet {
                iterations,
                score,
                duration_secs,
            } => format!(
                "[{}] loop:done:{} score={:.2} {:.1}s",
                timestamp, iterations, score, duration_secs
            ),
            LogEvent::MaxIterationsReached { iterations, .. } => {
                format!("[{}] loop:limit:{}", timestamp, iterations)
            }
        };
        let _ = writeln!(stderr, "{}", msg);
    }

    /// Truncate a string and pad to exact width
    fn truncate_with_padding(s: &str, max_len: usize, total_width: usize) -> String {
        let truncated = if s.chars().count() > max_len {
            let head: String = s.chars().take(max_len - 3).collect();
            format!("{}...", head)
        } else {
            s.to_string()
        };

        let padding_needed = total_width.saturating_sub(truncated.chars().count() + 1);
        format!("{}{}│", truncated, " ".repeat(padding_needed))
    }
}
