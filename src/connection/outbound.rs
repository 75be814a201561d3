//! Single-writer side of a session
//!
//! Every packet a session sends is written by one task that owns the outbound
//! half of the stream. A request's bytes and its decode function travel in the
//! same [`Command`], and the task queues the decode function only once the
//! whole buffer is on the wire. A caller that stops waiting therefore never
//! leaves half a packet behind or a response without its decoder.

use super::inbound::Job;
use crate::protocol::{encode_message, FrontendMessage};
use crate::sink::SharedSink;
use crate::{Error, Result};
use bytes::BytesMut;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};

pub(crate) type BoxedWrite = Box<dyn AsyncWrite + Send + Unpin>;

/// Work for the writer task
pub(crate) enum Command {
    /// Write `buf`, report `messages`, then queue `job` for the reader
    Write {
        buf: BytesMut,
        messages: Vec<FrontendMessage>,
        job: Option<Job>,
        done: oneshot::Sender<Result<()>>,
    },
    /// Send Terminate, shut the stream down and stop
    Close { done: oneshot::Sender<Result<()>> },
}

/// The writer task
///
/// Runs until a `Close` command or until every sender is gone. A request
/// whose decode function cannot be queued because the reader has stopped is
/// not written at all and fails with [`Error::ConnectionClosed`].
pub(crate) async fn run_writer(
    mut writer: BoxedWrite,
    mut commands: mpsc::UnboundedReceiver<Command>,
    jobs: mpsc::Sender<Job>,
    sink: SharedSink,
) {
    let mut broken = false;

    while let Some(command) = commands.recv().await {
        match command {
            Command::Write {
                buf,
                messages,
                job,
                done,
            } => {
                if broken {
                    let _ = done.send(Err(Error::ConnectionClosed));
                    continue;
                }

                let result = match job {
                    // Waits here while the receive queue is full
                    Some(job) => match jobs.reserve().await {
                        Ok(permit) => {
                            let written = write_reported(&mut writer, &buf, &messages, &sink).await;
                            if written.is_ok() {
                                permit.send(job);
                            }
                            written
                        }
                        Err(_) => Err(Error::ConnectionClosed),
                    },
                    None => write_reported(&mut writer, &buf, &messages, &sink).await,
                };

                if let Err(Error::Io(err)) = &result {
                    tracing::warn!("write failed, outbound stream unusable: {}", err);
                    broken = true;
                }
                let _ = done.send(result);
            }
            Command::Close { done } => {
                let result = if broken {
                    Ok(())
                } else {
                    terminate(&mut writer, &sink).await
                };
                let _ = done.send(result);
                break;
            }
        }
    }
}

async fn terminate(writer: &mut BoxedWrite, sink: &SharedSink) -> Result<()> {
    let terminate = [FrontendMessage::Terminate];
    let buf = encode_message(&terminate[0])?;
    let result = write_reported(writer, &buf, &terminate, sink).await;
    if let Err(err) = writer.shutdown().await {
        tracing::debug!("shutdown after terminate failed: {}", err);
    }
    result
}

async fn write_reported(
    writer: &mut BoxedWrite,
    buf: &[u8],
    messages: &[FrontendMessage],
    sink: &SharedSink,
) -> Result<()> {
    if buf.is_empty() {
        return Ok(());
    }
    writer.write_all(buf).await?;
    writer.flush().await?;

    for msg in messages {
        crate::metrics::counters::packet_sent(msg.tag().name());
        sink.sent(msg);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::inbound::bind;
    use crate::sink::Recorder;
    use tokio::io::{duplex, AsyncReadExt};

    #[tokio::test]
    async fn test_job_not_queued_when_reader_gone() {
        let (client, mut server) = duplex(64);
        let (jobs_tx, jobs_rx) = mpsc::channel(1);
        drop(jobs_rx);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let recorder = Recorder::new();
        let writer = tokio::spawn(run_writer(
            Box::new(client),
            commands_rx,
            jobs_tx,
            SharedSink::new(Some(Box::new(recorder.clone()))),
        ));

        let (job, _pending) = bind(|inbound| Box::pin(async move { inbound.receive_message().await }));
        let (done, result) = oneshot::channel();
        commands_tx
            .send(Command::Write {
                buf: encode_message(&FrontendMessage::Sync).unwrap(),
                messages: vec![FrontendMessage::Sync],
                job: Some(job),
                done,
            })
            .ok()
            .unwrap();
        assert!(matches!(result.await.unwrap(), Err(Error::ConnectionClosed)));

        let (done, result) = oneshot::channel();
        commands_tx.send(Command::Close { done }).ok().unwrap();
        result.await.unwrap().unwrap();
        writer.await.unwrap();

        // Only Terminate reached the stream
        let mut buf = Vec::new();
        server.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, [b'X', 0, 0, 0, 4]);
        assert_eq!(recorder.lines(), vec!["-> TERMINATE"]);
    }
}
