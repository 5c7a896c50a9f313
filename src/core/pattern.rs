//! Timeout-bounded waits for a regular expression in the device's output.

use crate::core::port::LinePort;
use crate::domain::error::{LinePortError, LinePortResult};
use regex::Regex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

impl LinePort {
    /// Read lines until one contains a match for `pattern`, or `timeout` expires.
    ///
    /// Returns the leftmost match in the first matching line. The pattern is
    /// compiled before anything is spawned, and the search task has finished by
    /// the time this returns, whichever way it ends.
    pub async fn wait_for_regex_timeout(&self, pattern: &str, timeout: Duration) -> LinePortResult<String> {
        let regex = Regex::new(pattern)?;
        let name = self.active_name().await?;

        info!(port = %name, "Waiting for pattern \"{}\"", pattern);

        let cancel = CancellationToken::new();
        let mut search = tokio::spawn(search_lines(self.clone(), regex, cancel.clone()));

        match tokio::time::timeout(timeout, &mut search).await {
            Ok(joined) => {
                let found = joined.map_err(|e| LinePortError::Task(e.to_string()))??;
                // The token only fires after the timer, so a finished search always carries a match
                let matched = found.ok_or_else(|| LinePortError::Timeout {
                    pattern: pattern.to_string(),
                    timeout,
                })?;
                self.observer().pattern_matched(&name, pattern, &matched);
                Ok(matched)
            }
            Err(_) => {
                cancel.cancel();
                if let Err(e) = search.await {
                    debug!(port = %name, "Pattern search ended abnormally: {}", e);
                }
                self.observer().pattern_timed_out(&name, pattern, timeout);
                Err(LinePortError::Timeout {
                    pattern: pattern.to_string(),
                    timeout,
                })
            }
        }
    }
}

/// Search loop run on its own task. `Ok(None)` means it was cancelled.
async fn search_lines(port: LinePort, regex: Regex, cancel: CancellationToken) -> LinePortResult<Option<String>> {
    loop {
        let Some(line) = port.next_line(&cancel).await? else {
            return Ok(None);
        };

        if let Some(found) = regex.find(&line.text) {
            return Ok(Some(found.as_str().to_string()));
        }
        if line.complete {
            debug!("No match in \"{}\"", line.text);
        }
    }
}
