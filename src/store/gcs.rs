//! Google Cloud Storage blob store
//!
//! Talks to the GCS JSON API directly over HTTPS with a bearer token:
//!
//! - existence: `GET /storage/v1/b/{bucket}/o/{object}`
//! - download:  `GET /storage/v1/b/{bucket}/o/{object}?alt=media`
//! - upload:    `POST /upload/storage/v1/b/{bucket}/o?uploadType=media&name={object}`
//!
//! Uploads are streamed: the writer hands chunks over a bounded channel to
//! an upload thread whose request body reads from the other end. The object
//! only exists once the request completes, so an upload abandoned halfway
//! leaves nothing under the key.

use crate::error::{CacherError, CacherResult};
use crate::store::{BlobStore, BlobWriter};
use std::io::{self, Read, Write};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::thread::{self, JoinHandle};
use tracing::{debug, info};
use ureq::http::Response;
use ureq::{Agent, Body, SendBody};

/// Public GCS endpoint
pub const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";

/// Bytes buffered by the writer before a chunk is handed to the upload thread
const CHUNK_SIZE: usize = 256 * 1024;

/// Chunks in flight between the writer and the upload thread
const CHANNEL_DEPTH: usize = 4;

/// Longest error body kept in error messages
const MAX_ERROR_BODY: usize = 512;

/// GCS bucket accessed through the JSON API
pub struct GcsStore {
    agent: Agent,
    endpoint: String,
    bucket: String,
    prefix: String,
    token: String,
}

impl GcsStore {
    pub fn new(
        endpoint: &str,
        bucket: impl Into<String>,
        prefix: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        let config = Agent::config_builder().http_status_as_error(false).build();
        Self {
            agent: Agent::new_with_config(config),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            bucket: bucket.into(),
            prefix: prefix.into(),
            token: token.into(),
        }
    }

    fn object_name(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/b/{}/o/{}",
            self.endpoint,
            encode_component(&self.bucket),
            encode_component(&self.object_name(key))
        )
    }

    fn upload_url(&self, key: &str) -> String {
        format!(
            "{}/upload/storage/v1/b/{}/o?uploadType=media&name={}",
            self.endpoint,
            encode_component(&self.bucket),
            encode_component(&self.object_name(key))
        )
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }

    fn get(&self, url: &str) -> CacherResult<Response<Body>> {
        self.agent
            .get(url)
            .header("Authorization", self.bearer())
            .call()
            .map_err(|e| CacherError::http(url, e))
    }
}

impl BlobStore for GcsStore {
    fn exists(&self, key: &str) -> CacherResult<bool> {
        let url = self.object_url(key);
        let response = self.get(&url)?;

        match response.status().as_u16() {
            200 => Ok(true),
            404 => Ok(false),
            _ => Err(status_error(&url, response)),
        }
    }

    fn open_writer(&self, key: &str) -> CacherResult<Box<dyn BlobWriter>> {
        let url = self.upload_url(key);
        let (tx, rx) = mpsc::sync_channel(CHANNEL_DEPTH);
        let agent = self.agent.clone();
        let auth = self.bearer();

        let upload = thread::Builder::new()
            .name("gcs-upload".to_string())
            .spawn(move || upload(agent, url, auth, rx))
            .map_err(|e| CacherError::Store(format!("starting upload thread: {}", e)))?;

        info!("Uploading to gs://{}/{}", self.bucket, self.object_name(key));
        Ok(Box::new(GcsBlobWriter {
            tx: Some(tx),
            upload: Some(upload),
            buffer: Vec::with_capacity(CHUNK_SIZE),
        }))
    }

    fn open_reader(&self, key: &str) -> CacherResult<Box<dyn Read>> {
        let url = format!("{}?alt=media", self.object_url(key));
        let response = self.get(&url)?;

        match response.status().as_u16() {
            200 => Ok(Box::new(response.into_body().into_reader())),
            404 => Err(CacherError::BlobNotFound(key.to_string())),
            _ => Err(status_error(&url, response)),
        }
    }

    fn describe(&self, key: &str) -> String {
        format!("gs://{}/{}", self.bucket, self.object_name(key))
    }
}

/// Body of the upload thread
fn upload(agent: Agent, url: String, auth: String, rx: Receiver<Chunk>) -> CacherResult<()> {
    let mut reader = ChannelReader::new(rx);
    let response = agent
        .post(&url)
        .header("Authorization", auth)
        .header("Content-Type", "application/gzip")
        .send(SendBody::from_reader(&mut reader))
        .map_err(|e| CacherError::http(&url, e))?;

    if !response.status().is_success() {
        return Err(status_error(&url, response));
    }
    debug!("Upload to {} complete", url);
    Ok(())
}

fn status_error(url: &str, mut response: Response<Body>) -> CacherError {
    let status = response.status().as_u16();
    let mut body = response.body_mut().read_to_string().unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    CacherError::StoreStatus {
        status,
        url: url.to_string(),
        body: body.trim().to_string(),
    }
}

/// Percent-encode a URL path segment or query value
pub fn encode_component(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                encoded.push(byte as char)
            }
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}

/// Message from the writer to the upload thread
enum Chunk {
    Data(Vec<u8>),
    /// All data sent; end the request body
    Done,
}

/// Request body fed from the writer's channel.
///
/// A channel closed without `Done` means the writer was dropped, and the
/// read fails so the request is aborted instead of committing a partial
/// object.
struct ChannelReader {
    rx: Receiver<Chunk>,
    current: Vec<u8>,
    pos: usize,
    done: bool,
}

impl ChannelReader {
    fn new(rx: Receiver<Chunk>) -> Self {
        Self {
            rx,
            current: Vec::new(),
            pos: 0,
            done: false,
        }
    }
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            if self.pos < self.current.len() {
                let n = buf.len().min(self.current.len() - self.pos);
                buf[..n].copy_from_slice(&self.current[self.pos..self.pos + n]);
                self.pos += n;
                return Ok(n);
            }
            if self.done {
                return Ok(0);
            }
            match self.rx.recv() {
                Ok(Chunk::Data(data)) => {
                    self.current = data;
                    self.pos = 0;
                }
                Ok(Chunk::Done) => self.done = true,
                Err(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::ConnectionAborted,
                        "upload abandoned before the archive was complete",
                    ))
                }
            }
        }
    }
}

struct GcsBlobWriter {
    tx: Option<SyncSender<Chunk>>,
    upload: Option<JoinHandle<CacherResult<()>>>,
    buffer: Vec<u8>,
}

impl GcsBlobWriter {
    fn send(&mut self, chunk: Chunk) -> io::Result<()> {
        let sent = match &self.tx {
            Some(tx) => tx.send(chunk).is_ok(),
            None => false,
        };
        if sent {
            return Ok(());
        }

        // The upload thread hung up; surface its error instead of a bare
        // broken pipe.
        self.tx = None;
        let reason = match self.join() {
            Err(e) => e.to_string(),
            Ok(()) => "upload finished before all data was sent".to_string(),
        };
        Err(io::Error::new(io::ErrorKind::BrokenPipe, reason))
    }

    fn send_buffered(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let data = std::mem::replace(&mut self.buffer, Vec::with_capacity(CHUNK_SIZE));
        self.send(Chunk::Data(data))
    }

    fn join(&mut self) -> CacherResult<()> {
        match self.upload.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| CacherError::Internal("upload thread panicked".to_string()))?,
            None => Ok(()),
        }
    }
}

impl Write for GcsBlobWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        if self.buffer.len() >= CHUNK_SIZE {
            self.send_buffered()?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send_buffered()
    }
}

impl BlobWriter for GcsBlobWriter {
    fn finish(mut self: Box<Self>) -> CacherResult<()> {
        self.send_buffered()
            .and_then(|_| self.send(Chunk::Done))
            .map_err(|e| CacherError::Store(e.to_string()))?;
        self.tx = None;
        self.join()
    }
}

impl Drop for GcsBlobWriter {
    fn drop(&mut self) {
        if self.tx.take().is_some() {
            if let Err(e) = self.join() {
                debug!("Abandoned upload ended with: {}", e);
            }
        }
    }
}
