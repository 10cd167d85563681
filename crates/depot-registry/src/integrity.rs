//! Streaming content digests.
//!
//! Digests are computed chunk by chunk as content flows past, so an upload
//! of any size is hashed in the same pass that stores it.

use std::collections::BTreeMap;
use std::fmt;
use std::pin::Pin;
use std::str::FromStr;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::channel::oneshot;
use futures::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};

use crate::content::{ByteStream, Content};
use crate::error::{RegistryError, Result};
use crate::key::Key;

/// A supported checksum algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl Algorithm {
    /// Every supported algorithm, in sibling-file order.
    pub const ALL: [Algorithm; 4] = [
        Algorithm::Md5,
        Algorithm::Sha1,
        Algorithm::Sha256,
        Algorithm::Sha512,
    ];

    /// File extension of the digest sibling, without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Algorithm::Md5 => "md5",
            Algorithm::Sha1 => "sha1",
            Algorithm::Sha256 => "sha256",
            Algorithm::Sha512 => "sha512",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        Algorithm::ALL.into_iter().find(|a| a.extension() == ext)
    }

    /// The sibling key holding this algorithm's digest of `key`.
    pub fn sibling(&self, key: &Key) -> Key {
        key.with_suffix(&format!(".{}", self.extension()))
    }

    fn hasher(&self) -> Hasher {
        match self {
            Algorithm::Md5 => Hasher::Md5(md5::Md5::new()),
            Algorithm::Sha1 => Hasher::Sha1(sha1::Sha1::new()),
            Algorithm::Sha256 => Hasher::Sha256(Sha256::new()),
            Algorithm::Sha512 => Hasher::Sha512(Sha512::new()),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.extension())
    }
}

impl FromStr for Algorithm {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Algorithm::from_extension(&s.to_ascii_lowercase())
            .ok_or_else(|| format!("unknown checksum algorithm: {s}"))
    }
}

/// Whether `key` names a digest sibling (`*.md5`, `*.sha1`, ...).
pub fn is_checksum_key(key: &Key) -> bool {
    key.name()
        .and_then(|name| name.rsplit_once('.'))
        .is_some_and(|(stem, ext)| !stem.is_empty() && Algorithm::from_extension(ext).is_some())
}

/// A computed digest: algorithm plus lowercase hex value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Checksum {
    algorithm: Algorithm,
    hex: String,
}

impl Checksum {
    /// Compute the digest of an in-memory buffer.
    pub fn compute(algorithm: Algorithm, data: &[u8]) -> Self {
        let mut hasher = algorithm.hasher();
        hasher.update(data);
        Checksum {
            algorithm,
            hex: hasher.finalize(),
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn as_str(&self) -> &str {
        &self.hex
    }

    /// Compare against the text of a recorded digest sibling.
    ///
    /// Only the first whitespace-separated token counts, case-insensitively,
    /// so `"<hex>  artifact.jar"` files match too.
    pub fn matches(&self, recorded: &str) -> bool {
        recorded
            .split_whitespace()
            .next()
            .is_some_and(|token| token.eq_ignore_ascii_case(&self.hex))
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hex)
    }
}

/// Digests of one piece of content, keyed by algorithm.
pub type ChecksumMap = BTreeMap<Algorithm, Checksum>;

enum Hasher {
    Md5(md5::Md5),
    Sha1(sha1::Sha1),
    Sha256(Sha256),
    Sha512(Sha512),
}

impl Hasher {
    fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Md5(h) => h.update(data),
            Hasher::Sha1(h) => h.update(data),
            Hasher::Sha256(h) => h.update(data),
            Hasher::Sha512(h) => h.update(data),
        }
    }

    fn finalize(self) -> String {
        match self {
            Hasher::Md5(h) => hex::encode(h.finalize()),
            Hasher::Sha1(h) => hex::encode(h.finalize()),
            Hasher::Sha256(h) => hex::encode(h.finalize()),
            Hasher::Sha512(h) => hex::encode(h.finalize()),
        }
    }
}

/// Several hashers fed the same bytes.
struct MultiHasher {
    hashers: Vec<(Algorithm, Hasher)>,
}

impl MultiHasher {
    fn new(algorithms: &[Algorithm]) -> Self {
        let mut algorithms = algorithms.to_vec();
        algorithms.sort();
        algorithms.dedup();
        MultiHasher {
            hashers: algorithms.into_iter().map(|a| (a, a.hasher())).collect(),
        }
    }

    fn update(&mut self, data: &[u8]) {
        for (_, hasher) in &mut self.hashers {
            hasher.update(data);
        }
    }

    fn finalize(self) -> ChecksumMap {
        self.hashers
            .into_iter()
            .map(|(algorithm, hasher)| {
                (
                    algorithm,
                    Checksum {
                        algorithm,
                        hex: hasher.finalize(),
                    },
                )
            })
            .collect()
    }
}

/// Consume `content` and return its digests.
pub async fn compute(content: Content, algorithms: &[Algorithm]) -> Result<ChecksumMap> {
    let mut hasher = MultiHasher::new(algorithms);
    let mut stream = content.into_stream();
    while let Some(chunk) = stream.next().await {
        hasher.update(&chunk?);
    }
    Ok(hasher.finalize())
}

/// Wrap `content` so its digests are computed while a downstream consumer
/// reads it.
///
/// Chunks pass through unchanged. The returned [`PendingChecksums`]
/// resolves once the wrapped stream has been read to the end.
pub fn digest_stream(content: Content, algorithms: &[Algorithm]) -> (Content, PendingChecksums) {
    let (tx, rx) = oneshot::channel();
    let size = content.size();
    let observed = DigestingStream {
        inner: content.into_stream(),
        hasher: Some(MultiHasher::new(algorithms)),
        done: Some(tx),
    };
    (Content::new(size, observed.boxed()), PendingChecksums { rx })
}

struct DigestingStream {
    inner: ByteStream,
    hasher: Option<MultiHasher>,
    done: Option<oneshot::Sender<ChecksumMap>>,
}

impl Stream for DigestingStream {
    type Item = Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match this.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                if let Some(hasher) = this.hasher.as_mut() {
                    hasher.update(&chunk);
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(err))) => {
                // A failed stream never reports checksums.
                this.hasher = None;
                this.done = None;
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                if let (Some(hasher), Some(done)) = (this.hasher.take(), this.done.take()) {
                    let _ = done.send(hasher.finalize());
                }
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Digests of a stream wrapped by [`digest_stream`], available after the
/// stream has been fully read.
#[derive(Debug)]
pub struct PendingChecksums {
    rx: oneshot::Receiver<ChecksumMap>,
}

impl PendingChecksums {
    /// Wait for the digests of `key`'s content.
    ///
    /// Fails if the stream errored or was dropped before its end.
    pub async fn resolve(self, key: &Key) -> Result<ChecksumMap> {
        self.rx.await.map_err(|_| RegistryError::Upload {
            path: key.to_string(),
            detail: "content stream ended before checksums were computed".to_string(),
        })
    }
}
