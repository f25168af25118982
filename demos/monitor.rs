use lwcp_client::{Channel, LwcpClient, MessageType, DEFAULT_PORT};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "127.0.0.1".to_string());
    let port = match args.next() {
        Some(port) => port.parse()?,
        None => DEFAULT_PORT,
    };

    let client = LwcpClient::connect(host, port).await?;
    let console = client.console();

    console.on_error(|messages| {
        for m in messages {
            tracing::warn!(error = m.error_message().unwrap_or_default(), "console error");
        }
    });

    match console.show_profile().await? {
        Some(profile) => println!(
            "Show profile {}: {}",
            profile.id.map(|id| id.to_string()).unwrap_or_default(),
            profile.name.unwrap_or_default()
        ),
        None => println!("Console did not report a show profile"),
    }

    for number in 1..=4 {
        if let Some(level) = console.channel_gain(Channel::fader(number)).await? {
            println!("Fader {} at {} dB", number, level.gain);
        }
    }

    let mut states = client.subscribe(MessageType::FaderState);
    let mut gains = client.subscribe(MessageType::FaderGain);
    let watch = tokio::time::sleep(Duration::from_secs(60));
    tokio::pin!(watch);

    println!("Watching channel changes for 60 seconds...");
    loop {
        tokio::select! {
            _ = &mut watch => break,
            _ = client.closed() => {
                println!("Console closed the connection");
                break;
            }
            batch = states.recv() => {
                for m in batch? {
                    if let Some(state) = m.fader_state() {
                        println!("{:?} {}", state.channel, if state.on { "ON" } else { "OFF" });
                    }
                }
            }
            batch = gains.recv() => {
                for m in batch? {
                    if let Some(level) = m.fader_gain() {
                        println!("{:?} {} dB", level.channel, level.gain);
                    }
                }
            }
        }
    }

    client.stop().await;
    Ok(())
}
