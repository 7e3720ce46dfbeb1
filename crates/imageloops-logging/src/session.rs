use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Represents each line type in the run JSONL file.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionLine {
    RunStart {
        timestamp: DateTime<Utc>,
        prompt: String,
        output_dir: PathBuf,
        producer: String,
        critic: String,
        max_iterations: usize,
        threshold: f64,
        strategy: String,
        aggregation: String,
    },
    Iteration {
        iteration_number: usize,
        prompt: String,
        artifact_path: Option<PathBuf>,
        scores: BTreeMap<String, f64>,
        aggregate: Option<f64>,
        suggestions: Vec<String>,
        error: Option<String>,
        timestamp: DateTime<Utc>,
    },
    RunEnd {
        reason: String,
        iterations: usize,
        final_artifact: Option<PathBuf>,
        aggregate: Option<f64>,
        error: Option<String>,
        duration_secs: f64,
        timestamp: DateTime<Utc>,
    },
}

/// Writes an audit record of one refinement run as JSONL.
pub struct SessionWriter {
    file: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl SessionWriter {
    /// Create a new SessionWriter in `dir`. The file name is the current UTC
    /// timestamp plus a short hash of the prompt.
    pub fn new(dir: &Path, prompt: &str) -> io::Result<Self> {
        fs::create_dir_all(dir)?;

        let now = Utc::now();
        let timestamp_str = now.format("%Y-%m-%dT%H-%M-%SZ").to_string();

        let mut hasher = Sha256::new();
        hasher.update(prompt.as_bytes());
        let hash = hex::encode(hasher.finalize());
        let short_hash = &hash[..6];

        let filename = format!("{}_{}.jsonl", timestamp_str, short_hash);
        let path = dir.join(filename);

        let file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        let writer = BufWriter::new(file);

        Ok(Self {
            file: Mutex::new(writer),
            path,
        })
    }

    /// Returns the path to the run file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the run start line.
    #[allow(clippy::too_many_arguments)]
    pub fn write_start(
        &self,
        prompt: &str,
        output_dir: &Path,
        producer: &str,
        critic: &str,
        max_iterations: usize,
        threshold: f64,
        strategy: &str,
        aggregation: &str,
    ) {
        let line = SessionLine::RunStart {
            timestamp: Utc::now(),
            prompt: prompt.to_string(),
            output_dir: output_dir.to_path_buf(),
            producer: producer.to_string(),
            critic: critic.to_string(),
            max_iterations,
            threshold,
            strategy: strategy.to_string(),
            aggregation: aggregation.to_string(),
        };
        self.write_line(&line);
    }

    /// Write an iteration line. Takes plain fields so this crate does not
    /// depend on the core record types.
    #[allow(clippy::too_many_arguments)]
    pub fn write_iteration(
        &self,
        iteration_number: usize,
        prompt: &str,
        artifact_path: Option<&Path>,
        scores: BTreeMap<String, f64>,
        aggregate: Option<f64>,
        suggestions: &[String],
        error: Option<&str>,
        timestamp: DateTime<Utc>,
    ) {
        let line = SessionLine::Iteration {
            iteration_number,
            prompt: prompt.to_string(),
            artifact_path: artifact_path.map(Path::to_path_buf),
            scores,
            aggregate,
            suggestions: suggestions.to_vec(),
            error: error.map(String::from),
            timestamp,
        };
        self.write_line(&line);
    }

    /// Write the run end line.
    pub fn write_end(
        &self,
        reason: &str,
        iterations: usize,
        final_artifact: Option<&Path>,
        aggregate: Option<f64>,
        error: Option<&str>,
        duration_secs: f64,
    ) {
        let line = SessionLine::RunEnd {
            reason: reason.to_string(),
            iterations,
            final_artifact: final_artifact.map(Path::to_path_buf),
            aggregate,
            error: error.map(String::from),
            duration_secs,
            timestamp: Utc::now(),
        };
        self.write_line(&line);
    }

    fn write_line(&self, line: &SessionLine) {
        if let Ok(json) = serde_json::to_string(line) {
            if let Ok(mut writer) = self.file.lock() {
                let _ = writeln!(writer, "{}", json);
                let _ = writer.flush();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_start_iteration_end() {
        let dir = tempfile::TempDir::new().unwrap();
        let writer = SessionWriter::new(dir.path(), "Heavy rain").unwrap();

        writer.write_start(
            "Heavy rain",
            dir.path(),
            "stability-ai/sdxl",
            "yorickvp/llava-13b",
            3,
            9.0,
            "refine",
            "mean",
        );
        let scores = BTreeMap::from([("content".to_string(), 8.0), ("color".to_string(), 6.0)]);
        writer.write_iteration(
            1,
            "Heavy rain",
            Some(Path::new("/out/rain_1.png")),
            scores,
            Some(7.0),
            &["Darker sky".to_string()],
            None,
            Utc::now(),
        );
        writer.write_end(
            "max_iterations_exhausted",
            3,
            Some(Path::new("/out/rain_3.png")),
            Some(7.5),
            None,
            12.0,
        );

        let content = std::fs::read_to_string(writer.path()).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["type"], "run_start");
        assert_eq!(lines[0]["max_iterations"], 3);
        assert_eq!(lines[1]["type"], "iteration");
        assert_eq!(lines[1]["scores"]["content"], 8.0);
        assert_eq!(lines[1]["artifact_path"], "/out/rain_1.png");
        assert_eq!(lines[2]["type"], "run_end");
        assert_eq!(lines[2]["reason"], "max_iterations_exhausted");
    }

    #[test]
    fn test_file_name_has_prompt_hash() {
        let dir = tempfile::TempDir::new().unwrap();
        let writer = SessionWriter::new(dir.path(), "fog").unwrap();
        let name = writer.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.ends_with(".jsonl"));
        let hash = name.trim_end_matches(".jsonl").rsplit('_').next().unwrap();
        assert_eq!(hash.len(), 6);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
