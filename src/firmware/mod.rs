//! ESP32 bootstrap.
//!
//! The PRO core runs the radio, the network stack, the connection
//! supervisor and the MQTT socket task. The APP core runs the dispatch loop
//! together with the OLED panel and the RGB LED, so nothing on the consumer
//! side ever waits on the radio.

mod board;
mod radio;
mod tasks;

use corelink::{
    config::{
        compiled_broker, compiled_wifi_credentials, DispatchPolicy, SupervisorPolicy,
        CHANNEL_DEPTH, MAILBOX_CAPACITY,
    },
    sinks::mqtt::MqttLink,
    Mailbox, StatusEvent, WordChannel,
};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use esp_hal::{
    interrupt::software::SoftwareInterruptControl,
    system::Stack,
    timer::timg::TimerGroup,
};
use log::LevelFilter;
use static_cell::StaticCell;

use self::radio::EspRadio;

pub(crate) type SharedMutex = CriticalSectionRawMutex;

pub(crate) const MQTT_QUEUE_DEPTH: usize = 4;
const APP_CORE_STACK_BYTES: usize = 16 * 1024;

pub(crate) static WORDS: WordChannel<SharedMutex, CHANNEL_DEPTH> = WordChannel::new();
pub(crate) static MAILBOX: Mailbox<SharedMutex, StatusEvent, MAILBOX_CAPACITY> = Mailbox::new();
pub(crate) static MQTT: MqttLink<SharedMutex, MQTT_QUEUE_DEPTH> = MqttLink::new();

static APP_CORE_STACK: StaticCell<Stack<APP_CORE_STACK_BYTES>> = StaticCell::new();
static APP_EXECUTOR: StaticCell<esp_rtos::embassy::Executor> = StaticCell::new();

pub(crate) fn run() -> ! {
    esp_println::logger::init_logger(LevelFilter::Info);
    esp_alloc::heap_allocator!(#[esp_hal::ram(reclaimed)] size: 72 * 1024);

    let peripherals = esp_hal::init(esp_hal::Config::default());
    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    let Some(credentials) = compiled_wifi_credentials() else {
        log::error!("boot: CORELINK_WIFI_SSID not set at build time");
        halt_forever();
    };
    let Some(broker) = compiled_broker() else {
        log::error!("boot: CORELINK_MQTT_BROKER not set or not a.b.c.d[:port]");
        halt_forever();
    };
    log::info!(
        "boot: corelink starting ssid={} broker={}:{}",
        credentials.ssid().unwrap_or("?"),
        broker.address,
        broker.port
    );

    let panel = match board::status_panel(
        peripherals.I2C0,
        peripherals.GPIO21,
        peripherals.GPIO22,
    ) {
        Ok(panel) => panel,
        Err(err) => {
            log::error!("boot: status panel init failed err={}", err);
            halt_forever();
        }
    };
    let led = match board::rgb_led(
        peripherals.LEDC,
        peripherals.GPIO25,
        peripherals.GPIO26,
        peripherals.GPIO27,
    ) {
        Ok(led) => led,
        Err(err) => {
            log::error!("boot: rgb led init failed err={}", err);
            halt_forever();
        }
    };

    let sw_ints = SoftwareInterruptControl::new(peripherals.SW_INTERRUPT);
    esp_rtos::start_second_core(
        peripherals.CPU_CTRL,
        sw_ints.software_interrupt0,
        sw_ints.software_interrupt1,
        APP_CORE_STACK.init(Stack::new()),
        move || {
            let executor = APP_EXECUTOR.init(esp_rtos::embassy::Executor::new());
            executor.run(move |spawner| {
                spawner.must_spawn(tasks::dispatch_task(
                    panel,
                    led,
                    broker,
                    DispatchPolicy::defaults(),
                ));
            })
        },
    );

    let mut executor = esp_rtos::embassy::Executor::new();
    let executor = unsafe { make_static(&mut executor) };
    executor.run(move |spawner| {
        let radio = EspRadio::new(peripherals.WIFI, spawner);
        spawner.must_spawn(tasks::supervisor_task(
            radio,
            credentials,
            SupervisorPolicy::defaults(),
        ));
        spawner.must_spawn(tasks::mqtt_task());
    });
}

unsafe fn make_static<T>(value: &mut T) -> &'static mut T {
    unsafe { core::mem::transmute(value) }
}

pub(crate) fn halt_forever() -> ! {
    loop {
        core::hint::spin_loop();
    }
}
