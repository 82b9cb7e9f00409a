use color_eyre::eyre::{eyre, Result};
use smart_button::config::DEFAULT_TIMEZONE;
use smart_button::*;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Get the events document (and optionally an IANA zone) from command line
    // arguments. If not provided, exit.
    let usage = "Usage: smartbuttond <events.json> [tz]";
    let args: Vec<_> = env::args().collect();
    if args.len() < 2 {
        eprintln!("{usage}");
        std::process::exit(1);
    }
    if args[1] == "-h" || args[1] == "--help" {
        eprintln!("{usage}");
        std::process::exit(0);
    }

    // Logs go to stderr, stdout carries the line protocol
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| EnvFilter::new("smart_button=info")),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init();
    color_eyre::install()?;

    let path = PathBuf::from(&args[1]);
    let zone: LocalZone = args
        .get(2)
        .map(String::as_str)
        .unwrap_or(DEFAULT_TIMEZONE)
        .parse()?;

    let settings = match env::var("SMARTBUTTON_POLL_MS") {
        Ok(ms) => Settings::with_poll_interval(Duration::from_millis(ms.parse()?)),
        Err(_) => Settings::default(),
    };
    debug!("Settings: {:?}", settings);

    // Audio runs on its own blocking worker
    let (dispatcher, audio_rx) = dispatch_channel(settings.queue_capacity);
    let sink: Box<dyn AudioSink> = match (
        env::var("SMARTBUTTON_SPEAK_CMD").ok(),
        env::var("SMARTBUTTON_PLAY_CMD").ok(),
    ) {
        (None, None) => Box::new(LogSink),
        (speak, play) => Box::new(CommandSink {
            speak,
            voice_flag: env::var("SMARTBUTTON_VOICE_FLAG").ok(),
            play,
        }),
    };
    let audio = spawn_audio_worker(audio_rx, sink);

    let mut scheduler = Scheduler::new(zone, settings, dispatcher);
    if let Err(e) = scheduler.reload_file(&path, SystemClock.now()) {
        eprintln!("ERR {e}");
        std::process::exit(1);
    }

    let (control, control_rx) = mpsc::channel(16);
    let running = tokio::spawn(scheduler.run(SystemClock, control_rx));

    // Inform about successful initialization
    println!("OK");

    // Mainloop: wait for user input, line by line
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut restart = false;
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                None
            }
        };
        let Some(line) = line else { break };

        // Read command and execute it
        match line.trim() {
            "click" => {
                control.send(Control::Action(UserAction::ShortPress)).await?;
                println!("OK");
            }
            "hold" => {
                control.send(Control::Action(UserAction::LongPress)).await?;
                println!("OK");
            }
            "reload" => {
                let (reply, result) = oneshot::channel();
                control.send(Control::ReloadFile(path.clone(), reply)).await?;
                match result.await? {
                    Ok(count) => println!("OK {count}"),
                    Err(e) => {
                        eprintln!("ERR {e}");
                        restart = true;
                        break;
                    }
                }
            }
            "status" => {
                let (reply, due) = oneshot::channel();
                control.send(Control::Status(reply)).await?;
                let due = due.await?;
                let ids: Vec<String> = due.iter().map(|event| event.id.to_string()).collect();
                println!("OK {} {}", due.len(), ids.join(","));
            }
            "quit" => break,
            "" => {
                eprintln!("ERR No command given");
            }
            other => {
                eprintln!("ERR Unknown command: {other}");
            }
        }
    }

    // Closing the control channel stops the scheduler, which releases the
    // dispatcher and lets the audio worker drain and exit
    drop(control);
    let scheduler = running.await?;
    let restart = restart || scheduler.restart_needed();
    drop(scheduler);
    if audio.await.is_err() {
        warn!("Audio worker panicked");
    }

    if restart {
        return Err(eyre!("events document unreadable, restart needed"));
    }
    info!("Shut down");
    Ok(())
}
