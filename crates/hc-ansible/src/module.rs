//! The Ansible module envelope.
//!
//! A module binary is invoked as `<module> ARGS_FILE`, reads its arguments
//! from that JSON file and prints exactly one JSON object on stdout. Logs go
//! to stderr so they never corrupt the response.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use serde::de::DeserializeOwned;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};
use tracing::{Instrument, debug, info_span};
use tracing_subscriber::EnvFilter;

use crate::error::{ModuleError, Result};
use crate::version;

// ── Response ───────────────────────────────────────────────────────

/// Result of one module run. Data keys are emitted next to
/// `changed`, `failed` and `msg`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModuleResponse {
    msg: String,
    changed: bool,
    failed: bool,
    data: Map<String, Value>,
}

impl ModuleResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failure(msg: impl Into<String>) -> Self {
        Self::new().msg(msg).failed()
    }

    pub fn msg(mut self, msg: impl Into<String>) -> Self {
        self.msg = msg.into();
        self
    }

    pub fn changed(self) -> Self {
        self.set_changed(true)
    }

    pub fn set_changed(mut self, changed: bool) -> Self {
        self.changed = self.changed || changed;
        self
    }

    pub fn failed(mut self) -> Self {
        self.failed = true;
        self
    }

    pub fn set<T: Serialize>(mut self, key: &str, value: &T) -> Result<Self> {
        self.data.insert(key.to_string(), serde_json::to_value(value)?);
        Ok(self)
    }

    pub fn message(&self) -> &str {
        &self.msg
    }

    pub fn has_changed(&self) -> bool {
        self.changed
    }

    pub fn has_failed(&self) -> bool {
        self.failed
    }

    pub fn data(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn exit_code(&self) -> ExitCode {
        if self.failed {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        }
    }
}

impl Serialize for ModuleResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3 + self.data.len()))?;
        map.serialize_entry("changed", &self.changed)?;
        map.serialize_entry("failed", &self.failed)?;
        map.serialize_entry("msg", &self.msg)?;
        for (key, value) in &self.data {
            if matches!(key.as_str(), "changed" | "failed" | "msg") {
                continue;
            }
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

// ── Runner ─────────────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(disable_version_flag = true)]
pub struct ModuleCli {
    /// JSON file with the module arguments, written by Ansible
    pub args_file: Option<PathBuf>,

    /// Print version and exit
    #[arg(short = 'v', long = "version")]
    pub version: bool,
}

/// Log to stderr, `warn` unless `RUST_LOG` says otherwise.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();
}

/// Read and decode the arguments file.
pub fn load_args<A: DeserializeOwned>(path: Option<&Path>) -> Result<A> {
    let path = path.ok_or_else(|| ModuleError::Arguments("No arguments file provided".into()))?;
    let raw = std::fs::read_to_string(path)
        .map_err(|e| ModuleError::Arguments(format!("Cannot read arguments file: {e}")))?;
    serde_json::from_str(&raw)
        .map_err(|e| ModuleError::Arguments(format!("Cannot parse arguments file: {e}")))
}

/// Drive one module invocation end to end and map the outcome to an exit
/// code. Errors become a failed response; they never escape as panics.
pub async fn run_module<A, F, Fut>(name: &'static str, run: F) -> ExitCode
where
    A: DeserializeOwned,
    F: FnOnce(A) -> Fut,
    Fut: Future<Output = Result<ModuleResponse>>,
{
    init_tracing();

    let cli = ModuleCli::parse();
    if cli.version {
        println!("{}", version::get());
        return ExitCode::SUCCESS;
    }

    let response = match load_args::<A>(cli.args_file.as_deref()) {
        Ok(args) => {
            debug!(module = name, "arguments loaded");
            run(args)
                .instrument(info_span!("module", name))
                .await
                .unwrap_or_else(|e| ModuleResponse::failure(e.to_string()))
        }
        Err(e) => ModuleResponse::failure(e.to_string()),
    };

    emit(&response)
}

fn emit(response: &ModuleResponse) -> ExitCode {
    match serde_json::to_string(response) {
        Ok(json) => {
            println!("{json}");
            response.exit_code()
        }
        Err(e) => {
            println!(r#"{{"changed":false,"failed":true,"msg":"cannot encode module output: {e}"}}"#);
            ExitCode::FAILURE
        }
    }
}
