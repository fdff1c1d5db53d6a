use corelink::{
    config::{
        BrokerConfig, DispatchPolicy, SupervisorPolicy, WifiCredentials, MQTT_CLIENT_ID,
        MQTT_KEEP_ALIVE_SECS,
    },
    sinks::{
        mqtt::{run_session, PublishQueue},
        SessionState,
    },
    AckReporter, DispatchLoop, EventSender, Supervisor,
};
use embassy_net::{tcp::TcpSocket, Runner};
use embassy_time::{Duration, Timer};
use esp_radio::wifi::WifiDevice;

use super::{
    board::{Led, Panel},
    radio::{EspRadio, NET_STACK},
    MAILBOX, MQTT, WORDS,
};

const MQTT_SOCKET_BUFFER_BYTES: usize = 512;
const MQTT_RETRY_DELAY_MS: u64 = 5_000;

#[embassy_executor::task]
pub(crate) async fn net_task(mut runner: Runner<'static, WifiDevice<'static>>) {
    runner.run().await
}

#[embassy_executor::task]
pub(crate) async fn supervisor_task(
    radio: EspRadio,
    credentials: WifiCredentials,
    policy: SupervisorPolicy,
) {
    let mut supervisor = Supervisor::new(radio, EventSender::new(&WORDS), credentials, policy);
    supervisor.run().await
}

/// Owns the broker TCP connection. Waits for the consumer to start the
/// client, then keeps one session alive, reconnecting after failures.
#[embassy_executor::task]
pub(crate) async fn mqtt_task() {
    let broker = MQTT.wait_broker().await;
    let stack = *NET_STACK.get().await;
    let acks = AckReporter::new(&WORDS);
    let mut rx_buffer = [0u8; MQTT_SOCKET_BUFFER_BYTES];
    let mut tx_buffer = [0u8; MQTT_SOCKET_BUFFER_BYTES];

    loop {
        stack.wait_config_up().await;

        let mut socket = TcpSocket::new(stack, &mut rx_buffer, &mut tx_buffer);
        socket.set_timeout(Some(Duration::from_secs(
            u64::from(MQTT_KEEP_ALIVE_SECS) * 3 / 2,
        )));
        match socket.connect((broker.address, broker.port)).await {
            Ok(()) => {
                let err = run_session(&mut socket, &MQTT, acks, MQTT_CLIENT_ID).await;
                log::info!("mqtt: reconnecting after err={}", err.as_str());
            }
            Err(err) => {
                log::warn!(
                    "mqtt: tcp connect {}:{} err={:?}",
                    broker.address,
                    broker.port,
                    err
                );
                MQTT.report_session(SessionState::Failed);
            }
        }
        socket.abort();
        drop(socket);

        Timer::after(Duration::from_millis(MQTT_RETRY_DELAY_MS)).await;
    }
}

#[embassy_executor::task]
pub(crate) async fn dispatch_task(
    panel: Panel,
    led: Led,
    broker: BrokerConfig,
    policy: DispatchPolicy,
) {
    let mut dispatch = DispatchLoop::new(
        &WORDS,
        &MAILBOX,
        panel,
        led,
        PublishQueue::new(&MQTT),
        broker,
        policy,
    );
    dispatch.run().await
}
