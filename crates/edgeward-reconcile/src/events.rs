//! Watch events and the JSON-lines input adapter.
//!
//! Each input line carries one event:
//!
//! ```text
//! {"type":"route","kind":"added","object":{...route...}}
//! {"type":"endpoints","kind":"deleted","object":{...endpoints...}}
//! {"type":"route","kind":"synced"}
//! {"type":"synced"}                      both initial lists complete
//! ```

use std::fmt;

use edgeward_core::{Endpoints, Route};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Full-object notification from one stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WatchEvent<T> {
    Added { object: T },
    Modified { object: T },
    Deleted { object: T },
    /// The initial list has been delivered.
    Synced,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Routes,
    Endpoints,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Routes => write!(f, "routes"),
            Stream::Endpoints => write!(f, "endpoints"),
        }
    }
}

/// One parsed input line.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    Route(WatchEvent<Route>),
    Endpoints(WatchEvent<Endpoints>),
    Synced,
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum InputType {
    Route,
    Endpoints,
    Synced,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    input_type: InputType,
}

impl InputEvent {
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(line)?;
        let envelope = Envelope::deserialize(&value)?;
        Ok(match envelope.input_type {
            InputType::Route => InputEvent::Route(WatchEvent::deserialize(&value)?),
            InputType::Endpoints => InputEvent::Endpoints(WatchEvent::deserialize(&value)?),
            InputType::Synced => InputEvent::Synced,
        })
    }
}

/// Read JSON-lines events and fan them into the two ordered streams.
///
/// Blank lines and `#` comments are skipped, malformed lines are logged
/// and skipped. Returns at end of input or when a receiver is gone; the
/// senders are dropped either way, which closes the streams.
pub async fn pump_json_lines<R>(
    reader: R,
    routes: mpsc::Sender<WatchEvent<Route>>,
    endpoints: mpsc::Sender<WatchEvent<Endpoints>>,
) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let delivered = match InputEvent::parse(line) {
            Ok(InputEvent::Route(event)) => routes.send(event).await.is_ok(),
            Ok(InputEvent::Endpoints(event)) => endpoints.send(event).await.is_ok(),
            Ok(InputEvent::Synced) => {
                routes.send(WatchEvent::Synced).await.is_ok()
                    && endpoints.send(WatchEvent::Synced).await.is_ok()
            }
            Err(e) => {
                warn!(line = line_no, error = %e, "skipping malformed event");
                continue;
            }
        };
        if !delivered {
            debug!("event consumer gone, stopping input");
            return Ok(());
        }
    }

    info!(lines = line_no, "event input reached end");
    Ok(())
}
