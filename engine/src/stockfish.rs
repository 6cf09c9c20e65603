use crate::uci::{parse_uci_message, UciMessage};
use crate::{EngineCommand, EngineEvent, GoParams};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Child;
use tokio::sync::mpsc;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct StockfishEngine {
    process: Child,
    command_tx: mpsc::Sender<EngineCommand>,
    event_rx: mpsc::Receiver<EngineEvent>,
}

/// Configuration for launching and tuning an engine process.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Explicit executable path. Searched for in common locations when unset.
    pub path: Option<PathBuf>,
    pub threads: Option<u32>,
    pub hash_mb: Option<u32>,
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Stockfish executable not found")]
    NotFound,
    #[error("failed to spawn {path}: {source}")]
    Spawn {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("engine pipe unavailable: {0}")]
    Pipe(&'static str),
    #[error("engine IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("engine closed before the UCI handshake completed")]
    HandshakeClosed,
    #[error("timed out waiting for the UCI handshake")]
    HandshakeTimeout,
    #[error("engine command channel closed")]
    Closed,
}

impl StockfishEngine {
    /// Spawn a new Stockfish instance and complete the UCI handshake.
    #[tracing::instrument(level = "info")]
    pub async fn spawn_with_config(config: EngineConfig) -> Result<Self, EngineError> {
        let path = match config.path.clone() {
            Some(path) => path,
            None => find_stockfish_path().ok_or(EngineError::NotFound)?,
        };
        tracing::info!("Spawning Stockfish at {:?}", path);

        let mut process = tokio::process::Command::new(&path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| {
                tracing::error!("Failed to spawn Stockfish: {}", source);
                EngineError::Spawn {
                    path: path.display().to_string(),
                    source,
                }
            })?;

        let mut stdin = process.stdin.take().ok_or(EngineError::Pipe("stdin"))?;
        let stdout = process.stdout.take().ok_or(EngineError::Pipe("stdout"))?;

        stdin.write_all(b"uci\n").await?;
        stdin.flush().await?;

        let (command_tx, mut command_rx) = mpsc::channel::<EngineCommand>(32);
        let (event_tx, mut event_rx) = mpsc::channel::<EngineEvent>(64);

        // Output reader: stdout lines -> engine events
        let reader_tx = event_tx.clone();
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            let mut line = String::new();

            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => {
                        tracing::warn!("Stockfish stdout EOF - engine closed");
                        break;
                    }
                    Ok(_) => {
                        let trimmed = line.trim();
                        tracing::trace!("UCI << {}", trimmed);

                        let event = match parse_uci_message(trimmed) {
                            Ok(UciMessage::UciOk) | Ok(UciMessage::ReadyOk) => EngineEvent::Ready,
                            Ok(UciMessage::BestMove(mv)) => {
                                tracing::debug!("Received bestmove: {:?}", mv);
                                EngineEvent::BestMove(mv)
                            }
                            Ok(UciMessage::Info(info)) => EngineEvent::Info(info),
                            Err(_) => {
                                tracing::trace!("Unparsed UCI line: {}", trimmed);
                                continue;
                            }
                        };

                        if reader_tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::error!("Error reading from Stockfish stdout: {}", e);
                        let _ = reader_tx.send(EngineEvent::Error(e.to_string())).await;
                        break;
                    }
                }
            }
            tracing::debug!("Output reader task exiting");
        });
        drop(event_tx);

        // Wait for uciok
        let handshake = tokio::time::timeout(HANDSHAKE_TIMEOUT, async {
            while let Some(event) = event_rx.recv().await {
                if matches!(event, EngineEvent::Ready) {
                    return Ok(());
                }
            }
            Err(EngineError::HandshakeClosed)
        })
        .await;
        match handshake {
            Ok(Ok(())) => tracing::debug!("Received uciok, engine ready"),
            Ok(Err(e)) => {
                tracing::error!("Engine initialization failed: {}", e);
                return Err(e);
            }
            Err(_) => {
                tracing::error!("Timeout waiting for uciok");
                let _ = process.kill().await;
                return Err(EngineError::HandshakeTimeout);
            }
        }

        let options = [
            ("Threads", config.threads.map(|t| t.clamp(1, 16))),
            ("Hash", config.hash_mb.map(|mb| mb.clamp(1, 2048))),
        ];
        for (name, value) in options {
            let Some(value) = value else { continue };
            tracing::info!(option = name, value, "Setting engine option");
            let cmd = EngineCommand::SetOption {
                name: name.to_string(),
                value: Some(value.to_string()),
            };
            stdin.write_all(format_command(&cmd).as_bytes()).await?;
        }
        stdin.flush().await?;

        // Stdin writer
        let (stdin_tx, mut stdin_rx) = mpsc::channel::<String>(32);
        tokio::spawn(async move {
            while let Some(cmd) = stdin_rx.recv().await {
                tracing::trace!("UCI >> {}", cmd.trim());
                if let Err(e) = stdin.write_all(cmd.as_bytes()).await {
                    tracing::error!("Failed to write to stdin: {}", e);
                    break;
                }
                if let Err(e) = stdin.flush().await {
                    tracing::error!("Failed to flush stdin: {}", e);
                    break;
                }
            }
            tracing::debug!("Stdin writer task exiting");
        });

        let _ = stdin_tx.send("isready\n".to_string()).await;

        // Command processor: typed commands -> UCI text
        tokio::spawn(async move {
            while let Some(cmd) = command_rx.recv().await {
                let quit = matches!(cmd, EngineCommand::Quit);
                let line = format_command(&cmd);
                tracing::debug!("Engine command: {}", line.trim());
                if stdin_tx.send(line).await.is_err() || quit {
                    break;
                }
            }
            tracing::debug!("Command processor task exiting");
        });

        tracing::info!("Stockfish engine spawned and initialized");
        Ok(Self {
            process,
            command_tx,
            event_rx,
        })
    }

    /// Send a command to the engine
    pub async fn send_command(&self, cmd: EngineCommand) -> Result<(), EngineError> {
        self.command_tx
            .send(cmd)
            .await
            .map_err(|_| EngineError::Closed)
    }

    /// Receive the next engine event. `None` once the engine has exited.
    pub async fn recv_event(&mut self) -> Option<EngineEvent> {
        self.event_rx.recv().await
    }

    /// Shutdown the engine
    pub async fn shutdown(mut self) {
        let _ = self.send_command(EngineCommand::Quit).await;
        if tokio::time::timeout(Duration::from_secs(1), self.process.wait())
            .await
            .is_err()
        {
            let _ = self.process.kill().await;
        }
    }
}

/// Render a command as a UCI line, newline included.
pub(crate) fn format_command(cmd: &EngineCommand) -> String {
    let mut line = match cmd {
        EngineCommand::SetPosition { fen } => format!("position fen {}", fen),
        EngineCommand::SetOption { name, value } => match value {
            Some(val) => format!("setoption name {} value {}", name, val),
            None => format!("setoption name {}", name),
        },
        EngineCommand::Go(params) => format_go(params),
        EngineCommand::Stop => "stop".to_string(),
        EngineCommand::Quit => "quit".to_string(),
    };
    line.push('\n');
    line
}

fn format_go(params: &GoParams) -> String {
    if let Some(nodes) = params.nodes {
        format!("go nodes {}", nodes)
    } else if let Some(movetime) = params.movetime {
        match params.depth {
            Some(depth) => format!("go depth {} movetime {}", depth, movetime),
            None => format!("go movetime {}", movetime),
        }
    } else if let Some(depth) = params.depth {
        format!("go depth {}", depth)
    } else {
        "go movetime 1000".to_string() // Default 1 second
    }
}

/// Find Stockfish executable in common locations
pub fn find_stockfish_path() -> Option<PathBuf> {
    let paths = [
        "/usr/local/bin/stockfish",
        "/usr/bin/stockfish",
        "/opt/homebrew/bin/stockfish",
        "/usr/games/stockfish",
    ];

    if let Some(found) = paths.iter().map(Path::new).find(|p| p.exists()) {
        return Some(found.to_path_buf());
    }

    // Fall back to PATH lookup
    std::env::var_os("PATH").and_then(|path| {
        std::env::split_paths(&path)
            .map(|dir| dir.join("stockfish"))
            .find(|candidate| candidate.is_file())
    })
}
