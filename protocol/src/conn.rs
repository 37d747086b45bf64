//! Frame transport shared by both peers.
//!
//! A [`Connection`] knows how to move whole frames, nothing about what they
//! mean. Partial reads and writes are absorbed by the underlying `Framed`.

use std::time::Duration;

use anyhow::Result;
use futures::{SinkExt, StreamExt};
use serde::{de::DeserializeOwned, Serialize};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
    time,
};
use tokio_util::codec::Framed;
use utils::codec::FrameCodec;

use crate::{MasterMsg, SessionError, WorkerMsg};

/// Master side of a session: sends [`MasterMsg`], receives [`WorkerMsg`].
pub type MasterConnection<S = TcpStream> = Connection<S, MasterMsg, WorkerMsg>;

/// Worker side of a session: sends [`WorkerMsg`], receives [`MasterMsg`].
pub type WorkerConnection<S = TcpStream> = Connection<S, WorkerMsg, MasterMsg>;

pub struct Connection<S, Out, In> {
    conn: Framed<S, FrameCodec<Out, In>>,
}

impl<S, Out, In> Connection<S, Out, In>
where
    S: AsyncRead + AsyncWrite + Unpin,
    Out: Serialize,
    In: DeserializeOwned,
{
    pub fn new(stream: S) -> Self {
        Self {
            conn: Framed::new(stream, FrameCodec::new()),
        }
    }

    /// Writes one frame and flushes it.
    pub async fn send(&mut self, msg: Out) -> Result<()> {
        self.conn.send(msg).await?;
        Ok(())
    }

    /// Waits for the next whole frame. A closed peer is
    /// [`SessionError::ConnectionBroken`].
    pub async fn recv(&mut self) -> Result<In> {
        match self.conn.next().await {
            Some(Ok(msg)) => Ok(msg),
            Some(Err(err)) => Err(err),
            None => Err(SessionError::ConnectionBroken.into()),
        }
    }

    /// Like [`recv`](Self::recv), bounded by `timeout`.
    ///
    /// Bytes already buffered survive an elapsed timeout, so a timed-out call
    /// can simply be retried.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Result<In> {
        match time::timeout(timeout, self.recv()).await {
            Ok(res) => res,
            Err(_) => Err(SessionError::Timeout.into()),
        }
    }

    pub fn get_ref(&self) -> &S {
        self.conn.get_ref()
    }

    pub fn into_inner(self) -> S {
        self.conn.into_inner()
    }
}
