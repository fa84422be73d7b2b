//! Anomaly detection via an external classifier subprocess
//!
//! The classifier is a long-lived python child speaking one JSON object per
//! line over a pair of pipes. Requests are serialized behind a mutex (single
//! in-flight) and bounded by a 5 second deadline; a slow or dead child must
//! never stall the pipeline beyond that.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::info;

/// Deadline for one prediction
const PREDICT_TIMEOUT: Duration = Duration::from_secs(5);

/// Classifier settings
#[derive(Debug, Clone)]
pub struct AnomalySettings {
    pub enabled: bool,
    pub threshold: f64,
    pub model_path: String,
    pub scaler_path: String,
    pub python_script: String,
}

/// Errors from the classifier
#[derive(Debug, Error)]
pub enum AnomalyError {
    #[error("local detector disabled")]
    Disabled,
    #[error("prediction timeout")]
    Timeout,
    #[error("classifier pipe error: {0}")]
    Io(#[from] std::io::Error),
    #[error("classifier protocol error: {0}")]
    Protocol(String),
    #[error("classifier error: {0}")]
    Model(String),
}

#[derive(Debug, Deserialize)]
struct Prediction {
    #[serde(default)]
    label: String,
    #[serde(default)]
    score: f64,
    #[serde(default)]
    #[allow(dead_code)]
    confidence: f64,
    #[serde(default)]
    error: String,
}

struct ChildIo {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    // Held so the child is killed when the detector drops
    _child: Child,
}

/// Handle to the classifier subprocess
pub struct AnomalyDetector {
    settings: AnomalySettings,
    io: Mutex<ChildIo>,
}

impl AnomalyDetector {
    /// Spawn the classifier child. Fails when disabled or when any of the
    /// model, scaler, or script files is missing.
    pub fn spawn(settings: AnomalySettings) -> anyhow::Result<Self> {
        if !settings.enabled {
            anyhow::bail!("local detector disabled");
        }
        for (what, path) in [
            ("model", &settings.model_path),
            ("scaler", &settings.scaler_path),
            ("python script", &settings.python_script),
        ] {
            if !Path::new(path).exists() {
                anyhow::bail!("{} file not found: {}", what, path);
            }
        }

        let mut child = Command::new("python3")
            .arg(&settings.python_script)
            .arg(&settings.model_path)
            .arg(&settings.scaler_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| anyhow::anyhow!("failed to start python server: {}", e))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow::anyhow!("failed to open classifier stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow::anyhow!("failed to open classifier stdout"))?;

        info!(
            script = %settings.python_script,
            model = %settings.model_path,
            "Anomaly classifier subprocess started"
        );

        Ok(Self {
            settings,
            io: Mutex::new(ChildIo {
                stdin,
                stdout: BufReader::new(stdout),
                _child: child,
            }),
        })
    }

    /// Send one CSV feature vector and read back `(label, score)`.
    /// Bounded by the 5 second deadline regardless of child health.
    pub async fn predict_csv(&self, csv: &str) -> Result<(String, f64), AnomalyError> {
        if !self.settings.enabled {
            return Err(AnomalyError::Disabled);
        }

        let mut io = self.io.lock().await;

        let exchange = async {
            let mut line = csv.trim().to_string();
            line.push('\n');
            io.stdin.write_all(line.as_bytes()).await?;
            io.stdin.flush().await?;

            let mut response = String::new();
            let n = io.stdout.read_line(&mut response).await?;
            if n == 0 {
                return Err(AnomalyError::Protocol("classifier closed its pipe".into()));
            }

            let prediction: Prediction = serde_json::from_str(response.trim())
                .map_err(|e| AnomalyError::Protocol(e.to_string()))?;
            if !prediction.error.is_empty() {
                return Err(AnomalyError::Model(prediction.error));
            }
            Ok((prediction.label, prediction.score))
        };

        match tokio::time::timeout(PREDICT_TIMEOUT, exchange).await {
            Ok(result) => result,
            Err(_) => Err(AnomalyError::Timeout),
        }
    }

    /// Decide whether to block on `(label, score)` against the threshold
    pub fn is_anomalous(&self, label: &str, score: f64) -> bool {
        is_anomalous(label, score, self.settings.threshold)
    }
}

/// `score >= threshold`, or a clearly anomalous label with a score still
/// above `max(0.5, threshold * 0.8)`
pub fn is_anomalous(label: &str, score: f64, threshold: f64) -> bool {
    if score >= threshold {
        return true;
    }
    let label = label.to_lowercase();
    if label.contains("anom") || label.contains("malicious") || label.contains("attack") {
        return score >= f64::max(0.5, threshold * 0.8);
    }
    false
}
