use std::{future::Future, net::SocketAddr};

use anyhow::{Context, Result};
use tokio::{
    io::{self, AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    select,
    task::JoinHandle,
};
use tracing::{debug, warn};

use crate::{
    cli::ClientArgs,
    frame::{EXIT_TOKEN, FrameError, read_frame, write_frame},
};

/// Sending side of a connection to the chat server.
pub struct Connection {
    writer: OwnedWriteHalf,
}

/// Receiving side of a connection to the chat server.
pub struct Receiver {
    reader: BufReader<OwnedReadHalf>,
}

impl Connection {
    /// Connects to `server` and logs in as `login`.
    pub async fn connect(server: SocketAddr, login: &str) -> Result<(Self, Receiver)> {
        let stream = TcpStream::connect(server)
            .await
            .with_context(|| format!("failed to connect to {server}"))?;

        debug!("connected to {server}");

        let (reader, mut writer) = stream.into_split();
        write_frame(&mut writer, login)
            .await
            .context("failed to send login")?;

        Ok((
            Self { writer },
            Receiver {
                reader: BufReader::new(reader),
            },
        ))
    }

    pub async fn send(&mut self, message: &str) -> Result<(), FrameError> {
        write_frame(&mut self.writer, message).await
    }

    /// Tells the server the session is over and closes the write half.
    pub async fn close(mut self) -> Result<()> {
        write_frame(&mut self.writer, EXIT_TOKEN).await?;
        self.writer.shutdown().await?;
        Ok(())
    }
}

impl Receiver {
    /// Next message from the server, or `None` once it closed the connection.
    pub async fn recv(&mut self) -> Result<Option<String>, FrameError> {
        read_frame(&mut self.reader).await
    }
}

enum InputOutcome {
    Exit,
    ServerGone,
}

pub async fn run(args: ClientArgs) -> Result<()> {
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let login = match args.login {
        Some(login) => login,
        None => prompt_login(&mut stdin).await?,
    };

    let (mut connection, receiver) = Connection::connect(args.server, &login).await?;
    write_stdout(&format!(
        "*** connected as {login}; type \"{EXIT_TOKEN}\" to leave"
    ))
    .await?;

    let mut inbox = tokio::spawn(print_incoming(receiver));

    let outcome = run_input_loop(
        &mut connection,
        &mut stdin,
        &mut inbox,
        tokio::signal::ctrl_c(),
    )
    .await?;

    match outcome {
        InputOutcome::ServerGone => {
            write_stdout("*** server closed the connection").await?;
        }
        InputOutcome::Exit => {
            inbox.abort();
            if let Err(error) = connection.close().await {
                warn!(?error, "failed to close connection cleanly");
            }
            write_stdout("*** leaving chat").await?;
        }
    }

    Ok(())
}

async fn prompt_login(stdin: &mut Lines<BufReader<Stdin>>) -> Result<String> {
    write_stdout("enter login:").await?;
    let line = stdin
        .next_line()
        .await?
        .context("stdin closed before a login was entered")?;
    Ok(line.trim_end().to_string())
}

/// Forwards input lines until `exit`, end of input, `interrupt`, or the
/// receiver task finishing.
///
/// `interrupt` is polled across iterations, so one that fires while a line
/// is being sent is still seen on the next pass.
async fn run_input_loop<R, F>(
    connection: &mut Connection,
    input: &mut Lines<R>,
    inbox: &mut JoinHandle<()>,
    interrupt: F,
) -> Result<InputOutcome>
where
    R: AsyncBufRead + Unpin,
    F: Future<Output = io::Result<()>>,
{
    tokio::pin!(interrupt);

    loop {
        select! {
            _ = &mut *inbox => return Ok(InputOutcome::ServerGone),
            line = input.next_line() => {
                let Some(line) = line? else {
                    return Ok(InputOutcome::Exit);
                };
                if !handle_stdin_line(&line, connection).await? {
                    return Ok(InputOutcome::Exit);
                }
            }
            ctrl_c = &mut interrupt => {
                handle_ctrl_c(ctrl_c);
                return Ok(InputOutcome::Exit);
            }
        }
    }
}

async fn handle_stdin_line(line: &str, connection: &mut Connection) -> Result<bool> {
    let text = line.trim_end();
    if text.is_empty() {
        return Ok(true);
    }
    if text == EXIT_TOKEN {
        return Ok(false);
    }

    if let Err(error) = connection.send(text).await {
        write_stderr(&format!("!!! failed to send message: {error}")).await?;
    }
    Ok(true)
}

async fn print_incoming(mut receiver: Receiver) {
    loop {
        match receiver.recv().await {
            Ok(Some(message)) => {
                if message.is_empty() {
                    continue;
                }
                if let Err(error) = write_stdout(&message).await {
                    warn!(?error, "failed to print incoming message");
                    return;
                }
            }
            Ok(None) => return,
            Err(error) => {
                warn!(?error, "lost connection to server");
                return;
            }
        }
    }
}

fn handle_ctrl_c(result: io::Result<()>) {
    if let Err(error) = result {
        warn!(?error, "ctrl-c handler failed");
    }
}

async fn write_stdout(line: &str) -> io::Result<()> {
    // One write per line keeps the receiver task and the input loop from
    // interleaving halves of each other's output.
    let mut stdout = tokio::io::stdout();
    stdout.write_all(format!("{line}\n").as_bytes()).await?;
    stdout.flush().await
}

async fn write_stderr(line: &str) -> io::Result<()> {
    let mut stderr = tokio::io::stderr();
    stderr.write_all(format!("{line}\n").as_bytes()).await?;
    stderr.flush().await
}
