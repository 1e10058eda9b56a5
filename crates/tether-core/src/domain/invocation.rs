//! Invocation snapshot: the args/env pair handed to every callback and hook.

use serde::{Deserialize, Serialize};

/// Argument list and environment shared by every callback of a run.
///
/// The engine never parses or mutates it; it is pass-through data owned by
/// whoever built the context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    args: Vec<String>,
    env: Vec<(String, String)>,
}

impl Invocation {
    pub fn new<A, S>(args: A) -> Self
    where
        A: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
            env: Vec::new(),
        }
    }

    /// Capture the real process arguments and environment.
    ///
    /// Non UTF-8 entries are converted lossily.
    pub fn from_process() -> Self {
        Self {
            args: std::env::args_os()
                .map(|a| a.to_string_lossy().into_owned())
                .collect(),
            env: std::env::vars_os()
                .map(|(k, v)| {
                    (
                        k.to_string_lossy().into_owned(),
                        v.to_string_lossy().into_owned(),
                    )
                })
                .collect(),
        }
    }

    pub fn with_env<E, K, V>(mut self, env: E) -> Self
    where
        E: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env = env.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Positional argument `index`, if present.
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }

    /// First value for `key` in the captured environment.
    pub fn env_var(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn argc(&self) -> usize {
        self.args.len()
    }
}
