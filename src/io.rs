use crate::codec::Utf8Transcoder;
use crate::CsvResult;
use async_compression::tokio::bufread::{GzipDecoder, ZstdDecoder};
use bytes::{Bytes, BytesMut};
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use std::io;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncRead, BufReader};
use tokio_util::codec::FramedRead;
use tokio_util::io::ReaderStream;

/// Byte chunks ready for a [`ParseStage`](crate::ParseStage).
pub type ChunkStream = BoxStream<'static, io::Result<Bytes>>;

#[derive(Debug, Clone)]
pub struct SourceMeta {
    /// e.g. "application/gzip" or "text/csv"
    pub content_type: String,
    /// e.g. "gzip", "zstd", or empty
    pub content_encoding: String,
    /// just the key/filename (used for extension fallback)
    pub name_hint: String,
    /// Which character encoding to expect (defaults to UTF-8)
    pub charset: &'static encoding_rs::Encoding,
}

impl Default for SourceMeta {
    fn default() -> Self {
        Self {
            content_type: String::new(),
            content_encoding: String::new(),
            name_hint: String::new(),
            charset: encoding_rs::UTF_8,
        }
    }
}

impl SourceMeta {
    /// Best-effort meta from a file name alone.
    pub fn from_path(path: &Path) -> Self {
        let name_hint = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        let (content_type, content_encoding) =
            match path.extension().and_then(|s| s.to_str()).unwrap_or_default() {
                "gz" => ("application/gzip", "gzip"),
                "zst" => ("application/zstd", "zstd"),
                _ => ("text/csv", ""),
            };
        Self {
            content_type: content_type.into(),
            content_encoding: content_encoding.into(),
            name_hint,
            ..Default::default()
        }
    }

    pub fn with_charset(mut self, charset: &'static encoding_rs::Encoding) -> Self {
        self.charset = charset;
        self
    }

    fn is_gzip(&self) -> bool {
        let ce = self.content_encoding.to_ascii_lowercase();
        let ct = self.content_type.to_ascii_lowercase();
        ce.split(',').any(|s| s.trim() == "gzip")
            || matches!(ct.as_str(), "application/gzip" | "application/x-gzip")
            || self.name_hint.ends_with(".gz")
    }

    fn is_zstd(&self) -> bool {
        let ce = self.content_encoding.to_ascii_lowercase();
        ce.split(',').any(|s| s.trim() == "zstd")
            || self.content_type.eq_ignore_ascii_case("application/zstd")
            || self.name_hint.ends_with(".zst")
    }
}

/// Wrap a raw reader with decompression and UTF-8 transcoding as `meta`
/// asks, and cut it into chunks of at most `chunk_size` bytes.
pub fn chunk_stream<R>(raw: R, meta: &SourceMeta, chunk_size: usize) -> ChunkStream
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let buf = BufReader::with_capacity(chunk_size.max(8 * 1024), raw);
    let decompressed: Box<dyn AsyncRead + Unpin + Send> = if meta.is_gzip() {
        Box::new(GzipDecoder::new(buf))
    } else if meta.is_zstd() {
        Box::new(ZstdDecoder::new(buf))
    } else {
        Box::new(buf)
    };

    if meta.charset == encoding_rs::UTF_8 {
        ReaderStream::with_capacity(decompressed, chunk_size).boxed()
    } else {
        // UTF-8 output can be up to three times the input
        let read_size = (chunk_size / 3).max(1);
        FramedRead::with_capacity(decompressed, Utf8Transcoder::new(meta.charset), read_size)
            .map_ok(BytesMut::freeze)
            .boxed()
    }
}

/// Open a local file as a chunk stream.
pub async fn open_path(path: &Path, chunk_size: usize) -> CsvResult<(ChunkStream, SourceMeta)> {
    let file = File::open(path).await?;
    let meta = SourceMeta::from_path(path);
    Ok((chunk_stream(file, &meta, chunk_size), meta))
}
