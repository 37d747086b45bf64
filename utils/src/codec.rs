//! Length-delimited bincode framing.
//!
//! Every frame on the wire is `[u32 big-endian length][bincode payload]`.

use std::marker::PhantomData;

use bytes::BytesMut;
use serde::{de::DeserializeOwned, Serialize};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

/// Large enough for a whole bootstrap file in one frame.
pub const MAX_FRAME_LEN: usize = 256 * 1024 * 1024;

/// Encodes `Out` values and decodes `In` values.
pub struct FrameCodec<Out, In> {
    len_codec: LengthDelimitedCodec,
    phantom: PhantomData<fn(Out) -> In>,
}

impl<Out, In> FrameCodec<Out, In> {
    pub fn new() -> Self {
        Self {
            len_codec: LengthDelimitedCodec::builder()
                .length_field_length(4)
                .big_endian()
                .max_frame_length(MAX_FRAME_LEN)
                .new_codec(),
            phantom: PhantomData,
        }
    }
}

impl<Out, In> Default for FrameCodec<Out, In> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Out, In> Encoder<Out> for FrameCodec<Out, In>
where
    Out: Serialize,
{
    type Error = anyhow::Error;

    fn encode(&mut self, item: Out, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let msg = bincode::serialize(&item)?;
        self.len_codec.encode(bytes::Bytes::from(msg), dst)?;
        Ok(())
    }
}

impl<Out, In> Decoder for FrameCodec<Out, In>
where
    In: DeserializeOwned,
{
    type Item = In;

    type Error = anyhow::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(bytes) = self.len_codec.decode(src)? {
            let msg = bincode::deserialize(&*bytes)?;
            Ok(Some(msg))
        } else {
            Ok(None)
        }
    }
}
