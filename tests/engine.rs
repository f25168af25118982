use lwcp_client::{
    BusAssignment, Channel, ConnectionState, EngineConfig, Limit, LwcpClient, LwcpError,
    MessageType,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;

/// A fake console: accepts one connection and hands back its halves
async fn console() -> (LwcpClient, tokio::io::Lines<BufReader<OwnedReadHalf>>, OwnedWriteHalf) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });
    let client = LwcpClient::connect("127.0.0.1", port).await.unwrap();
    let (read_half, write_half) = accept.await.unwrap().into_split();

    (client, BufReader::new(read_half).lines(), write_half)
}

#[tokio::test]
async fn call_returns_typed_reply() {
    let (client, mut lines, mut device) = console().await;
    assert_eq!(client.state(), ConnectionState::Open);

    let device_task = tokio::spawn(async move {
        let request = lines.next_line().await.unwrap().unwrap();
        device
            .write_all(b"EVENT FaCH#1 Fader_Gain=-12.5\n")
            .await
            .unwrap();
        (request, lines, device)
    });

    let reply = client
        .call("GET FaCH#1 Fader_Gain", MessageType::FaderGain, Duration::from_secs(5))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply.len(), 1);
    let gain = reply[0].fader_gain().unwrap();
    assert_eq!(gain.channel.fader_number, Some(1));
    assert_eq!(gain.gain, -12.5);

    let (request, _lines, _device) = device_task.await.unwrap();
    assert_eq!(request, "GET FaCH#1 Fader_Gain");
    client.stop().await;
}

#[tokio::test]
async fn call_gives_up_after_its_timeout() {
    let (client, _lines, _device) = console().await;
    let wait = Duration::from_millis(150);

    let started = Instant::now();
    let reply = client
        .call("GET FaCH#1 ON_State", MessageType::FaderState, wait)
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert!(reply.is_none());
    assert!(elapsed >= wait);
    assert!(elapsed < wait + Duration::from_secs(2));
    client.stop().await;
}

#[tokio::test]
async fn refused_connection_is_reported() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let err = LwcpClient::connect("127.0.0.1", port).await.err().unwrap();
    assert!(matches!(err, LwcpError::Connect { port: p, .. } if p == port));
}

#[tokio::test]
async fn block_split_across_reads_arrives_as_one_message() {
    let (client, _lines, mut device) = console().await;
    let mut lists = client.subscribe(MessageType::ShowProfileList);

    device
        .write_all(b"INDI AppControl ShowProfList=%BeginEncap%<list>\r\n")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    device
        .write_all(b"<profile id=\"1\"/>\r\n")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    device.write_all(b"</list>%EndEncap%\r\n").await.unwrap();

    let batch = tokio::time::timeout(Duration::from_secs(5), lists.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(batch.len(), 1);
    let list = &batch[0].show_profile_list().unwrap().list;
    assert!(list.contains("<list>"));
    assert!(list.contains("<profile id=\"1\"/>"));
    assert!(list.contains("</list>"));
    client.stop().await;
}

#[tokio::test]
async fn bus_assignment_is_sent_and_empty_one_rejected() {
    let (client, mut lines, _device) = console().await;
    let console = client.console();

    let err = console
        .set_channel_bus(Channel::fader(2), BusAssignment::default())
        .unwrap_err();
    assert!(matches!(err, LwcpError::InvalidArgument(_)));

    console
        .set_channel_bus(
            Channel::fader(2),
            BusAssignment {
                pgm2: Some(true),
                prev: Some(false),
                ..Default::default()
            },
        )
        .unwrap();
    assert_eq!(
        lines.next_line().await.unwrap().unwrap(),
        "SET FaCH#2 Asg_PGM2=ON, Asg_PREV=OFF"
    );
    client.stop().await;
}

#[tokio::test]
async fn limited_subscription_expires_after_its_firings() {
    let (client, _lines, mut device) = console().await;
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    client.add_subscription(
        MessageType::FaderState,
        move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        },
        Limit::times(2).unwrap(),
    );
    let mut all = client.subscribe(MessageType::FaderState);

    for i in 1..=4 {
        device
            .write_all(format!("EVENT FaCH#{} ON_State=ON\n", i).as_bytes())
            .await
            .unwrap();
        // Wait for delivery so each line lands in its own batch
        all.recv().await.unwrap();
    }

    assert_eq!(fired.load(Ordering::SeqCst), 2);
    client.stop().await;
}

#[tokio::test]
async fn stop_closes_the_connection() {
    let (client, mut lines, _device) = console().await;
    client.stop().await;
    client.closed().await;

    assert_eq!(client.state(), ConnectionState::Closed);
    assert!(matches!(
        client.send_command("GET AppControl ShowProfID"),
        Err(LwcpError::ConnectionClosed)
    ));
    assert!(lines.next_line().await.unwrap().is_none());
}

#[tokio::test]
async fn login_precedes_commands() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });

    let config = EngineConfig::default().with_password("pw");
    let client = LwcpClient::connect_with_config("127.0.0.1", port, config)
        .await
        .unwrap();
    client.send_command("GET AppControl ShowProfID").unwrap();

    let mut lines = BufReader::new(accept.await.unwrap()).lines();
    assert_eq!(lines.next_line().await.unwrap().unwrap(), "LOGIN pw");
    assert_eq!(
        lines.next_line().await.unwrap().unwrap(),
        "GET AppControl ShowProfID"
    );
    client.stop().await;
}

#[tokio::test]
async fn command_queued_right_before_stop_is_delivered() {
    let (client, mut lines, _device) = console().await;
    client
        .console()
        .set_channel_state(Channel::fader(1), true)
        .unwrap();
    client.stop().await;

    assert_eq!(
        lines.next_line().await.unwrap().as_deref(),
        Some("SET FaCH#1 ON_State=ON")
    );
    assert!(lines.next_line().await.unwrap().is_none());
}

#[tokio::test]
async fn overlapping_console_queries_each_get_their_channel() {
    let (client, mut lines, mut device) = console().await;
    let console = client.console();
    let other = console.clone();

    let device_task = tokio::spawn(async move {
        lines.next_line().await.unwrap().unwrap();
        lines.next_line().await.unwrap().unwrap();
        device
            .write_all(b"INDI FaCH#1 Fader_Gain=-1\n")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        device
            .write_all(b"INDI FaCH#2 Fader_Gain=-2\n")
            .await
            .unwrap();
        (lines, device)
    });

    let (first, second) = tokio::join!(
        console.channel_gain(Channel::fader(1)),
        other.channel_gain(Channel::fader(2)),
    );
    let first = first.unwrap().unwrap();
    let second = second.unwrap().unwrap();
    assert_eq!((first.channel.fader_number, first.gain), (Some(1), -1.0));
    assert_eq!((second.channel.fader_number, second.gain), (Some(2), -2.0));

    let _ = device_task.await;
    client.stop().await;
}
