use std::{collections::HashSet, fmt};

/// Allow-list of caller API keys, fixed for the lifetime of the process.
#[derive(Clone, Default)]
pub struct AccessGuard {
    allowed: HashSet<String>,
}

impl AccessGuard {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut allowed = HashSet::new();
        for key in keys {
            let key = key.into();
            if key.trim().is_empty() {
                tracing::warn!("Ignoring blank entry in allowed API keys");
                continue;
            }
            allowed.insert(key);
        }

        Self { allowed }
    }

    /// Exact-match membership test. Blank keys are never valid.
    pub fn validate(&self, caller_key: &str) -> bool {
        !caller_key.trim().is_empty() && self.allowed.contains(caller_key)
    }

    pub fn len(&self) -> usize {
        self.allowed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }
}

impl fmt::Debug for AccessGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessGuard")
            .field("allowed", &self.allowed.len())
            .finish()
    }
}

/// Log-safe form of an API key: the first four characters followed by `***`.
pub fn redact_key(key: &str) -> String {
    let prefix: String = key.chars().take(4).collect();
    format!("{prefix}***")
}
