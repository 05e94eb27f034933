use core::{
    future::poll_fn,
    pin::Pin,
    task::{Context, Poll},
};
use std::{
    collections::VecDeque,
    io::{self, ErrorKind, Read, Write},
};

use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::trace;

use crate::{
    error::Error,
    obfuscation::{Direction, PacketProcessor},
};

const READ_CHUNK_LEN: usize = 16 * 1024;

pin_project! {
    /// Asynchronous packet stream over a TCP link, based on `Tokio` runtime.
    ///
    /// [`PacketStream`] splits the incoming byte stream into length-prefixed
    /// link packets, de-obfuscated with its [`PacketProcessor`], and writes
    /// outgoing packets the same way.
    #[derive(Debug)]
    pub struct PacketStream<IO> {
        stream: IO,
        processor: PacketProcessor,
        read_buf: Vec<u8>,
        received: VecDeque<Vec<u8>>,
        write_buf: Vec<u8>,
        written: usize,
        eof: bool,
    }
}

impl<IO> PacketStream<IO> {
    /// Creates a new [`PacketStream`] over the underlying `stream`.
    pub fn new(processor: PacketProcessor, stream: IO) -> Self {
        Self {
            stream,
            processor,
            read_buf: Vec::with_capacity(READ_CHUNK_LEN),
            received: VecDeque::new(),
            write_buf: vec![],
            written: 0,
            eof: false,
        }
    }

    /// Returns a reference to the internal stream.
    pub fn inner_stream(&self) -> &IO {
        &self.stream
    }

    /// Returns a mutable reference to the inner stream.
    pub fn inner_stream_mut(&mut self) -> &mut IO {
        &mut self.stream
    }

    /// Queues `packet` for sending. Nothing is written until
    /// [`poll_send`](Self::poll_send) or [`send`](Self::send) is called.
    pub fn start_send(&mut self, packet: &[u8]) -> Result<(), Error> {
        let framed = self
            .processor
            .stream_from_packet(packet, Direction::Outbound)?;
        self.write_buf.extend_from_slice(&framed);
        Ok(())
    }
}

impl<IO> PacketStream<IO>
where
    IO: AsyncRead + Unpin,
{
    /// Polls for the next inbound packet.
    ///
    /// Resolves to `None` once the peer closed the stream on a packet
    /// boundary. A stream closed in the middle of a packet is an
    /// [`ErrorKind::UnexpectedEof`] error.
    pub fn poll_recv(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<Option<Vec<u8>>>> {
        let me = self.project();
        loop {
            if let Some(packet) = me.received.pop_front() {
                return Poll::Ready(Ok(Some(packet)));
            }
            if *me.eof {
                return if me.read_buf.is_empty() {
                    Poll::Ready(Ok(None))
                } else {
                    Poll::Ready(Err(ErrorKind::UnexpectedEof.into()))
                };
            }

            let mut chunk = [0u8; READ_CHUNK_LEN];
            let mut reader = SyncReadAdapter {
                io: &mut *me.stream,
                cx: &mut *cx,
            };
            match reader.read(&mut chunk) {
                Ok(0) => *me.eof = true,
                Ok(n) => {
                    me.read_buf.extend_from_slice(&chunk[..n]);
                    let (packets, consumed) = me
                        .processor
                        .packets_from_stream(me.read_buf, Direction::Inbound);
                    me.read_buf.drain(..consumed);
                    me.received.extend(packets);
                }
                // Wait for more data, pending.
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Poll::Pending,
                Err(e) => return Poll::Ready(Err(e)),
            }
        }
    }

    /// Receives the next inbound packet, `None` at end of stream.
    pub async fn recv(&mut self) -> io::Result<Option<Vec<u8>>> {
        poll_fn(|cx| Pin::new(&mut *self).poll_recv(cx)).await
    }
}

impl<IO> PacketStream<IO>
where
    IO: AsyncWrite + Unpin,
{
    /// Polls until every queued packet is written and flushed.
    pub fn poll_send(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let me = self.project();
        let mut writer = SyncWriteAdapter {
            io: &mut *me.stream,
            cx,
        };
        while *me.written < me.write_buf.len() {
            match writer.write(&me.write_buf[*me.written..]) {
                Ok(0) => return Poll::Ready(Err(ErrorKind::WriteZero.into())),
                Ok(n) => *me.written += n,
                // pending, wait for I/O.
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Poll::Pending,
                Err(e) => return Poll::Ready(Err(e)),
            }
        }
        match writer.flush() {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::WouldBlock => return Poll::Pending,
            Err(e) => return Poll::Ready(Err(e)),
        }
        trace!(len = *me.written, "stream packets written");
        me.write_buf.clear();
        *me.written = 0;
        Poll::Ready(Ok(()))
    }

    /// Queues `packet` and writes every queued packet.
    pub async fn send(&mut self, packet: &[u8]) -> io::Result<()> {
        self.start_send(packet)?;
        poll_fn(|cx| Pin::new(&mut *self).poll_send(cx)).await
    }

    /// Writes every queued packet, then shuts down the write half of the
    /// underlying stream.
    pub async fn shutdown(&mut self) -> io::Result<()> {
        poll_fn(|cx| Pin::new(&mut *self).poll_send(cx)).await?;
        poll_fn(|cx| Pin::new(&mut self.stream).poll_shutdown(cx)).await
    }
}

/// An adapter that implements a [`Read`] interface for [`AsyncRead`] types and an
/// associated [`Context`].
///
/// Turns `Poll::Pending` into `WouldBlock`.
///
/// The credit goes to the [futures-rustls](https://github.com/rustls/futures-rustls)
/// project for this adapter.
struct SyncReadAdapter<'a, 'b, T> {
    io: &'a mut T,
    cx: &'a mut Context<'b>,
}

impl<T: AsyncRead + Unpin> Read for SyncReadAdapter<'_, '_, T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut buf = ReadBuf::new(buf);
        match Pin::new(&mut self.io).poll_read(self.cx, &mut buf) {
            Poll::Ready(Ok(())) => Ok(buf.filled().len()),
            Poll::Ready(Err(err)) => Err(err),
            Poll::Pending => Err(ErrorKind::WouldBlock.into()),
        }
    }
}

/// An adapter that implements a [`Write`] interface for [`AsyncWrite`] types and an
/// associated [`Context`].
///
/// Turns `Poll::Pending` into `WouldBlock`.
struct SyncWriteAdapter<'a, 'b, T> {
    io: &'a mut T,
    cx: &'a mut Context<'b>,
}

impl<T: AsyncWrite + Unpin> Write for SyncWriteAdapter<'_, '_, T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match Pin::new(&mut self.io).poll_write(self.cx, buf) {
            Poll::Ready(result) => result,
            Poll::Pending => Err(ErrorKind::WouldBlock.into()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match Pin::new(&mut self.io).poll_flush(self.cx) {
            Poll::Ready(result) => result,
            Poll::Pending => Err(ErrorKind::WouldBlock.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::{
        io::{AsyncWriteExt, duplex},
        net::{TcpListener, TcpStream},
        spawn,
    };

    use super::*;
    use crate::obfuscation::ObfuscationMethod;

    fn processor() -> PacketProcessor {
        PacketProcessor::new(ObfuscationMethod::XorObfuscate(b"xorpatch".to_vec())).unwrap()
    }

    fn packets() -> Vec<Vec<u8>> {
        vec![
            vec![0x38; 14],
            vec![],
            (0..=255u8).cycle().take(65535).collect(),
            b"\x48\x00\x00\x01payload".to_vec(),
        ]
    }

    #[tokio::test]
    async fn test_tcp_echo() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server_task = spawn(async move {
            let (server_inner, _) = listener.accept().await.unwrap();
            let mut server = PacketStream::new(processor(), server_inner);
            while let Some(packet) = server.recv().await.unwrap() {
                server.send(&packet).await.unwrap();
            }
            server.shutdown().await.unwrap();
        });

        let client_inner = TcpStream::connect(addr).await.unwrap();
        let mut client = PacketStream::new(processor(), client_inner);
        for packet in packets() {
            client.start_send(&packet).unwrap();
        }
        client.shutdown().await.unwrap();

        for packet in packets() {
            assert_eq!(client.recv().await.unwrap(), Some(packet));
        }
        assert_eq!(client.recv().await.unwrap(), None);
        server_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_small_pipe() {
        // forces partial reads and writes
        let (a, b) = duplex(61);
        let writer_task = spawn(async move {
            let mut writer = PacketStream::new(processor(), a);
            for packet in packets() {
                writer.send(&packet).await.unwrap();
            }
        });

        let mut reader = PacketStream::new(processor(), b);
        for packet in packets() {
            assert_eq!(reader.recv().await.unwrap(), Some(packet));
        }
        writer_task.await.unwrap();
        assert_eq!(reader.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_truncated_stream() {
        let (mut a, b) = duplex(1024);
        a.write_all(&[0x00, 0x05, 1, 2]).await.unwrap();
        drop(a);

        let mut reader = PacketStream::new(processor(), b);
        let err = reader.recv().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn test_oversized_packet() {
        let (a, _b) = duplex(1024);
        let mut writer = PacketStream::new(processor(), a);
        let err = writer.send(&vec![0; 65536]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Other);
    }
}
