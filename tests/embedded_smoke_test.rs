//! On-device checks for the word channel and mailbox under the real timer.

#![no_std]
#![no_main]

#[cfg(test)]
#[embedded_test::tests(executor = esp_rtos::embassy::Executor::new())]
mod tests {
    use core::net::Ipv4Addr;

    use corelink::{
        link::codec::{decode, decode_address, Decoded},
        EventSender, LinkStatus, Mailbox, StatusEvent, WordChannel,
    };
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
    use embassy_time::{with_timeout, Duration, Instant, Timer};

    type Words = WordChannel<CriticalSectionRawMutex, 8>;

    #[init]
    fn init() {
        let peripherals = esp_hal::init(esp_hal::Config::default());
        let timg0 = esp_hal::timer::timg::TimerGroup::new(peripherals.TIMG0);
        esp_rtos::start(timg0.timer0);
    }

    #[test]
    async fn timer_advances() {
        let start = Instant::now();
        Timer::after(Duration::from_millis(10)).await;
        assert!(start.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    async fn address_frame_crosses_the_channel_intact() {
        static WORDS: Words = Words::new();
        let sender = EventSender::new(&WORDS);
        sender
            .send(StatusEvent::wifi(2, LinkStatus::Connected))
            .await;
        sender
            .send(StatusEvent::IpAssigned {
                addr: Ipv4Addr::new(192, 168, 4, 2),
            })
            .await;

        let first = WORDS.try_pop().unwrap();
        assert_eq!(
            decode(first),
            Ok(Decoded::Event(StatusEvent::wifi(2, LinkStatus::Connected)))
        );
        assert_eq!(decode(WORDS.try_pop().unwrap()), Ok(Decoded::AddressFollows));
        assert_eq!(
            decode_address(WORDS.pop().await),
            Ipv4Addr::new(192, 168, 4, 2)
        );
    }

    #[test]
    async fn wait_ready_times_out_on_an_empty_channel() {
        static WORDS: Words = Words::new();
        let waited = with_timeout(Duration::from_millis(5), WORDS.wait_ready()).await;
        assert!(waited.is_err());
    }

    #[test]
    async fn mailbox_rejects_past_capacity() {
        let mailbox: Mailbox<CriticalSectionRawMutex, StatusEvent, 2> = Mailbox::new();
        assert!(mailbox.try_push(StatusEvent::PingAck { ok: true }));
        assert!(mailbox.try_push(StatusEvent::PingAck { ok: false }));
        assert!(!mailbox.try_push(StatusEvent::PingAck { ok: true }));
        assert_eq!(mailbox.try_pop(), Some(StatusEvent::PingAck { ok: true }));
    }
}
