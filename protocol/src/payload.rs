//! Typed views over opaque argument and result blobs.

use serde::{de::DeserializeOwned, Serialize};

use crate::Payload;

pub trait ToPayload {
    fn to_payload(&self) -> anyhow::Result<Payload>;
}

impl<T> ToPayload for T
where
    T: Serialize,
{
    fn to_payload(&self) -> anyhow::Result<Payload> {
        Ok(bincode::serialize(self)?)
    }
}

pub trait FromPayload: Sized {
    fn from_payload(payload: &[u8]) -> anyhow::Result<Self>;
}

impl<T> FromPayload for T
where
    T: DeserializeOwned,
{
    fn from_payload(payload: &[u8]) -> anyhow::Result<Self> {
        Ok(bincode::deserialize(payload)?)
    }
}
