use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::files::ownership::{FileOwnershipEntry, OwnershipLog};
use crate::files::store::FileStore;
use crate::hashspace::position;

const MAX_FILENAME_BYTES: u32 = 4096;
const MAX_PROVENANCE_BYTES: u32 = 1024;

/// Origin metadata attached to a transfer: which node originally holds the
/// file, and which node pushed this copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub local_owner: String,
    pub sender: String,
}

impl Provenance {
    pub fn encode(&self) -> String {
        format!("{}:{}", self.local_owner, self.sender)
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let (local_owner, sender) = raw.split_once(':')?;
        if local_owner.is_empty() || sender.is_empty() {
            return None;
        }
        Some(Self {
            local_owner: local_owner.to_string(),
            sender: sender.to_string(),
        })
    }
}

/// Pushes one file from disk to a peer's transfer listener.
pub async fn send_file(
    host: &str,
    port: u16,
    filename: &str,
    path: &Path,
    provenance: Option<&Provenance>,
) -> Result<()> {
    let mut file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("opening {:?} for transfer", path))?;
    let len = file.metadata().await?.len();

    let mut stream = TcpStream::connect((host, port))
        .await
        .with_context(|| format!("connecting to {}:{}", host, port))?;

    write_header(&mut stream, filename, len).await?;
    let copied = tokio::io::copy(&mut (&mut file).take(len), &mut stream).await?;
    if copied != len {
        bail!("file {:?} shrank mid-transfer ({} of {} bytes)", path, copied, len);
    }
    write_trailer(&mut stream, provenance).await?;
    stream.shutdown().await?;

    debug!("sent {} ({} bytes) to {}:{}", filename, len, host, port);
    Ok(())
}

async fn write_header<W: AsyncWrite + Unpin>(writer: &mut W, filename: &str, len: u64) -> Result<()> {
    let name = filename.as_bytes();
    if name.is_empty() || name.len() > MAX_FILENAME_BYTES as usize {
        bail!("filename length {} out of range", name.len());
    }
    writer.write_u32(name.len() as u32).await?;
    writer.write_all(name).await?;
    writer.write_u64(len).await?;
    Ok(())
}

async fn write_trailer<W: AsyncWrite + Unpin>(
    writer: &mut W,
    provenance: Option<&Provenance>,
) -> Result<()> {
    let encoded = provenance.map(Provenance::encode).unwrap_or_default();
    writer.write_u32(encoded.len() as u32).await?;
    writer.write_all(encoded.as_bytes()).await?;
    Ok(())
}

/// The long-lived receiving side of the channel.
pub struct TransferListener {
    listener: TcpListener,
    store: FileStore,
    log: Arc<OwnershipLog>,
    self_address: String,
}

impl TransferListener {
    pub async fn bind(
        addr: SocketAddr,
        store: FileStore,
        log: Arc<OwnershipLog>,
        self_address: String,
    ) -> Result<Self> {
        store.ensure_dir()?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("binding transfer listener on {}", addr))?;
        Ok(Self {
            listener,
            store,
            log,
            self_address,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts transfers until the shutdown signal flips. Each connection is
    /// handled on its own task so a slow sender never blocks the next one.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("transfer listener stopping");
                        return;
                    }
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let store = self.store.clone();
                            let log = self.log.clone();
                            let self_address = self.self_address.clone();
                            tokio::spawn(async move {
                                match receive_one(stream, &store, &log, &self_address).await {
                                    Ok(filename) => {
                                        debug!("received {} from {}", filename, peer)
                                    }
                                    Err(e) => warn!("transfer from {} failed: {}", peer, e),
                                }
                            });
                        }
                        Err(e) => {
                            warn!("transfer accept failed: {}", e);
                            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                        }
                    }
                }
            }
        }
    }
}

/// Receives one complete transfer. On any failure the staging file is swept
/// away and no ownership entry is recorded — a partial replica must look
/// exactly like an absent one.
async fn receive_one(
    mut stream: TcpStream,
    store: &FileStore,
    log: &OwnershipLog,
    self_address: &str,
) -> Result<String> {
    let filename = read_filename(&mut stream).await?;
    match receive_body(&mut stream, store, log, self_address, &filename).await {
        Ok(()) => Ok(filename),
        Err(e) => {
            let _ = std::fs::remove_file(store.staging_path(&filename));
            Err(e)
        }
    }
}

async fn read_filename<R: AsyncRead + Unpin>(reader: &mut R) -> Result<String> {
    let len = reader.read_u32().await?;
    if len == 0 || len > MAX_FILENAME_BYTES {
        bail!("filename length {} out of range", len);
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await?;
    let filename = String::from_utf8(buf).context("filename is not UTF-8")?;
    // The filename keys a flat store; anything path-like is hostile input.
    if filename.contains('/') || filename.contains('\\') || filename.starts_with('.') {
        bail!("refusing filename {:?}", filename);
    }
    Ok(filename)
}

async fn receive_body(
    stream: &mut TcpStream,
    store: &FileStore,
    log: &OwnershipLog,
    self_address: &str,
    filename: &str,
) -> Result<()> {
    let payload_len = stream.read_u64().await?;

    store.ensure_dir()?;
    let staging = store.staging_path(filename);
    let mut file = tokio::fs::File::create(&staging)
        .await
        .with_context(|| format!("creating staging file {:?}", staging))?;

    let copied = tokio::io::copy(&mut (&mut *stream).take(payload_len), &mut file).await?;
    if copied != payload_len {
        bail!(
            "connection dropped after {} of {} payload bytes",
            copied,
            payload_len
        );
    }

    let provenance = read_provenance(stream).await?;

    file.sync_all().await?;
    drop(file);
    store.commit(&staging, filename)?;

    if let Some(provenance) = provenance {
        log.record(FileOwnershipEntry {
            filename: filename.to_string(),
            file_hash: position(filename),
            local_owner: provenance.local_owner,
            replica_owner: self_address.to_string(),
            locked: false,
        });
    }
    Ok(())
}

async fn read_provenance<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Provenance>> {
    let len = reader.read_u32().await?;
    if len == 0 {
        return Ok(None);
    }
    if len > MAX_PROVENANCE_BYTES {
        bail!("provenance length {} out of range", len);
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await?;
    let raw = String::from_utf8(buf).context("provenance is not UTF-8")?;
    Ok(Provenance::parse(&raw))
}
