use bytes::{Buf, BytesMut};
use std::io;
use tokio_util::codec::Decoder;

/// Re-encodes a byte stream in some other charset as UTF-8.
pub struct Utf8Transcoder {
    decoder: encoding_rs::Decoder,
    finished: bool,
}

impl Utf8Transcoder {
    pub fn new(encoding: &'static encoding_rs::Encoding) -> Self {
        Self {
            decoder: encoding.new_decoder(),
            finished: false,
        }
    }

    fn transcode(&mut self, src: &mut BytesMut, last: bool) -> io::Result<Option<BytesMut>> {
        if self.finished || (src.is_empty() && !last) {
            return Ok(None);
        }

        let capacity = self
            .decoder
            .max_utf8_buffer_length(src.len())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "chunk too large to transcode"))?;
        let mut out = BytesMut::zeroed(capacity);
        let (_result, read, written, _replaced) = self.decoder.decode_to_utf8(src, &mut out, last);
        src.advance(read);
        out.truncate(written);
        self.finished = last;

        Ok((!out.is_empty()).then_some(out))
    }
}

impl Decoder for Utf8Transcoder {
    type Item = BytesMut;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        self.transcode(src, false)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let out = self.transcode(src, true)?;
        src.clear();
        Ok(out)
    }
}
