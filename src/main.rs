use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::thread;

use anyhow::Context;
use tokio::signal;
use tokio::sync::oneshot;

use mp3play::audio::{AlsaSink, Interrupt, SymphoniaDecoder};
use mp3play::{Config, Outcome, Pipeline};

// AmigaDOS 风格的返回码
const RETURN_OK: u8 = 0;
const RETURN_ERROR: u8 = 10;
const RETURN_FAIL: u8 = 20;

type Session = Pipeline<SymphoniaDecoder, AlsaSink>;

#[tokio::main]
async fn main() -> ExitCode {
    // 初始化日志
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let program = args.first().cloned().unwrap_or_else(|| "mp3play".to_string());
    if args.len() != 2 {
        eprintln!("Usage: {} <mp3file>", program);
        return ExitCode::from(RETURN_FAIL);
    }
    let path = PathBuf::from(&args[1]);

    // 加载配置
    let config = match Config::new() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {}", program, e);
            return ExitCode::from(RETURN_FAIL);
        }
    };
    if let Err(e) = config.validate() {
        eprintln!("{}: {}", program, e);
        return ExitCode::from(RETURN_FAIL);
    }

    // 播放管线运行在独立的 std 线程中，打开设备和文件也在该线程完成
    let (ready_tx, ready_rx) = oneshot::channel();
    let (done_tx, mut done_rx) = oneshot::channel();
    let spawned = thread::Builder::new()
        .name("pipeline".into())
        .spawn(move || {
            let session = match open_session(&config, &path) {
                Ok((session, interrupt)) => {
                    if ready_tx.send(Ok(interrupt)).is_err() {
                        return;
                    }
                    session
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            let _ = done_tx.send(session.run());
        });
    if let Err(e) = spawned {
        log::error!("Failed to spawn pipeline thread: {}", e);
        return ExitCode::from(RETURN_FAIL);
    }

    let interrupt = match ready_rx.await {
        Ok(Ok(interrupt)) => interrupt,
        Ok(Err(e)) => {
            eprintln!("{}: {:#}", program, e);
            return ExitCode::from(RETURN_FAIL);
        }
        Err(_) => {
            log::error!("Pipeline thread exited during setup");
            return ExitCode::from(RETURN_FAIL);
        }
    };

    let result = tokio::select! {
        result = &mut done_rx => result,
        // 监听 Ctrl+C 信号，由管线在下一个等待点处理
        Ok(()) = signal::ctrl_c() => {
            log::info!("Received Ctrl+C, stopping playback");
            if !interrupt.raise() {
                log::debug!("Session already finished");
            }
            done_rx.await
        }
    };

    match result {
        Ok(Ok(report)) => match report.outcome {
            Outcome::Stopped => ExitCode::from(RETURN_OK),
            Outcome::Cancelled => {
                eprintln!("{}: ***Break", program);
                ExitCode::from(RETURN_ERROR)
            }
        },
        Ok(Err(e)) => {
            eprintln!("{}: {}", program, e);
            ExitCode::from(RETURN_ERROR)
        }
        Err(_) => {
            log::error!("Pipeline thread exited without a result");
            ExitCode::from(RETURN_FAIL)
        }
    }
}

/// Open device, stream and buffers, in that order. The decoder targets the
/// format the device actually negotiated.
fn open_session(config: &Config, path: &Path) -> anyhow::Result<(Session, Interrupt)> {
    let sink = AlsaSink::open(config.sink_config())
        .with_context(|| format!("Unable to open {}", config.playback_device))?;
    let params = sink.params().clone();
    let interrupt = sink.interrupt();

    let decoder = SymphoniaDecoder::open(
        path,
        &config.decoder_config(params.sample_rate, params.channels),
    )
    .with_context(|| format!("Failed to open {}", path.display()))?;

    let session = Pipeline::new(decoder, sink, config.buffer_size).context("Failed to allocate sample buffers")?;
    Ok((session, interrupt))
}
