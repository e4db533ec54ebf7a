use thiserror::Error;

use crate::files::ownership::FileMap;
use crate::hashspace::RingId;

/// Which ring pointer a correction targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    /// The receiver's successor pointer.
    Next,
    /// The receiver's predecessor pointer.
    Prev,
}

impl PointerKind {
    fn tag(self) -> &'static str {
        match self {
            PointerKind::Next => "NEXT",
            PointerKind::Prev => "PREV",
        }
    }
}

/// Every message of the control plane.
///
/// `encode`/`parse` are exact inverses for well-formed values. Filenames may
/// contain colons (the framing reads them greedily); addresses and tags may
/// not.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    /// Join announcement, broadcast by a starting node.
    Bootstrap { address: String, id: RingId },
    /// Leave announcement, broadcast after migration completes. Carries the
    /// leaver's pointers so its neighbors can re-link without a lookup.
    Shutdown {
        address: String,
        predecessor: RingId,
        successor: RingId,
    },
    /// Ring size, unicast by the registry to a joiner; ends its bootstrap wait.
    NumNodes { count: usize },
    /// Order to replicate a local file to `target`, unicast by the registry.
    Replicate {
        target: String,
        filename: String,
        file_hash: RingId,
    },
    /// Order to record ownership of a replica, unicast by the registry to the
    /// node that will hold it.
    Log {
        local_owner: String,
        filename: String,
    },
    /// A node reporting one of its local files to the registry.
    Report { address: String, filename: String },
    /// Anti-entropy: ask a peer for its file map; answered with `FileMap`.
    RequestFileMap { address: String },
    /// Anti-entropy payload: `filename -> locked`, JSON-encoded on the wire.
    FileMap { entries: FileMap },
    /// Ask the receiver to run its own sync cycle (chained anti-entropy).
    SyncRequest,
    /// Point-to-point pointer repair: if the receiver's pointer of `kind`
    /// currently equals `replaced`, it adopts `sender`.
    Correction {
        kind: PointerKind,
        replaced: RingId,
        sender: RingId,
    },
}

#[derive(Debug, Error)]
pub enum WireError {
    #[error("unknown message tag in {0:?}")]
    UnknownTag(String),
    #[error("malformed {tag} message: {raw:?}")]
    Malformed { tag: &'static str, raw: String },
}

impl ControlMessage {
    pub fn encode(&self) -> String {
        match self {
            ControlMessage::Bootstrap { address, id } => {
                format!("BOOTSTRAP:{}:{}", address, id)
            }
            ControlMessage::Shutdown {
                address,
                predecessor,
                successor,
            } => format!("SHUTDOWN:{}:{}:{}", address, predecessor, successor),
            ControlMessage::NumNodes { count } => format!("NUMNODES:{}", count),
            ControlMessage::Replicate {
                target,
                filename,
                file_hash,
            } => format!("REPLICATE:{}:{}:{}", target, filename, file_hash),
            ControlMessage::Log {
                local_owner,
                filename,
            } => format!("LOG:{}:{}", local_owner, filename),
            ControlMessage::Report { address, filename } => {
                format!("REPORT:{}:{}", address, filename)
            }
            ControlMessage::RequestFileMap { address } => {
                format!("REQUEST_FILE_MAP:{}", address)
            }
            ControlMessage::FileMap { entries } => {
                // Infallible: string keys and bool values only.
                let json = serde_json::to_string(entries).unwrap_or_else(|_| "{}".to_string());
                format!("FILEMAP:{}", json)
            }
            ControlMessage::SyncRequest => "SYNC_REQUEST".to_string(),
            ControlMessage::Correction {
                kind,
                replaced,
                sender,
            } => format!("{}:{}:{}", kind.tag(), replaced, sender),
        }
    }

    pub fn parse(raw: &str) -> Result<Self, WireError> {
        let raw = raw.trim_end_matches(['\r', '\n']);
        let (tag, rest) = match raw.split_once(':') {
            Some((tag, rest)) => (tag, rest),
            None => (raw, ""),
        };

        match tag {
            "BOOTSTRAP" => {
                let (address, id) = split_pair(rest, "BOOTSTRAP", raw)?;
                Ok(ControlMessage::Bootstrap {
                    address: address.to_string(),
                    id: parse_id(id, "BOOTSTRAP", raw)?,
                })
            }
            "SHUTDOWN" => {
                let mut fields = rest.split(':');
                let (address, pred, succ) = match (fields.next(), fields.next(), fields.next(), fields.next()) {
                    (Some(a), Some(p), Some(s), None) => (a, p, s),
                    _ => return Err(malformed("SHUTDOWN", raw)),
                };
                Ok(ControlMessage::Shutdown {
                    address: address.to_string(),
                    predecessor: parse_id(pred, "SHUTDOWN", raw)?,
                    successor: parse_id(succ, "SHUTDOWN", raw)?,
                })
            }
            "NUMNODES" => {
                let count = rest
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| malformed("NUMNODES", raw))?;
                Ok(ControlMessage::NumNodes { count })
            }
            "REPLICATE" => {
                // Target first, hash last; the filename in between keeps any
                // colons it contains.
                let (target, tail) = rest.split_once(':').ok_or_else(|| malformed("REPLICATE", raw))?;
                let (filename, hash) = tail
                    .rsplit_once(':')
                    .ok_or_else(|| malformed("REPLICATE", raw))?;
                if filename.is_empty() {
                    return Err(malformed("REPLICATE", raw));
                }
                Ok(ControlMessage::Replicate {
                    target: target.to_string(),
                    filename: filename.to_string(),
                    file_hash: parse_id(hash, "REPLICATE", raw)?,
                })
            }
            "LOG" => {
                let (local_owner, filename) =
                    rest.split_once(':').ok_or_else(|| malformed("LOG", raw))?;
                Ok(ControlMessage::Log {
                    local_owner: local_owner.to_string(),
                    filename: filename.to_string(),
                })
            }
            "REPORT" => {
                let (address, filename) =
                    rest.split_once(':').ok_or_else(|| malformed("REPORT", raw))?;
                Ok(ControlMessage::Report {
                    address: address.to_string(),
                    filename: filename.to_string(),
                })
            }
            "REQUEST_FILE_MAP" => {
                if rest.is_empty() {
                    return Err(malformed("REQUEST_FILE_MAP", raw));
                }
                Ok(ControlMessage::RequestFileMap {
                    address: rest.to_string(),
                })
            }
            "FILEMAP" => {
                let entries: FileMap =
                    serde_json::from_str(rest).map_err(|_| malformed("FILEMAP", raw))?;
                Ok(ControlMessage::FileMap { entries })
            }
            "SYNC_REQUEST" => Ok(ControlMessage::SyncRequest),
            "NEXT" | "PREV" => {
                let kind = if tag == "NEXT" {
                    PointerKind::Next
                } else {
                    PointerKind::Prev
                };
                let (replaced, sender) = split_pair(rest, "correction", raw)?;
                Ok(ControlMessage::Correction {
                    kind,
                    replaced: parse_id(replaced, "correction", raw)?,
                    sender: parse_id(sender, "correction", raw)?,
                })
            }
            _ => Err(WireError::UnknownTag(raw.to_string())),
        }
    }
}

fn split_pair<'a>(rest: &'a str, tag: &'static str, raw: &str) -> Result<(&'a str, &'a str), WireError> {
    match rest.split_once(':') {
        Some((a, b)) if !a.is_empty() && !b.contains(':') => Ok((a, b)),
        _ => Err(malformed(tag, raw)),
    }
}

fn parse_id(field: &str, tag: &'static str, raw: &str) -> Result<RingId, WireError> {
    field
        .trim()
        .parse::<RingId>()
        .map_err(|_| malformed(tag, raw))
}

fn malformed(tag: &'static str, raw: &str) -> WireError {
    WireError::Malformed {
        tag,
        raw: raw.to_string(),
    }
}
