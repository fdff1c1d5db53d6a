pub mod codec;

use embassy_sync::{blocking_mutex::raw::RawMutex, channel::Channel, mutex::Mutex};

use self::codec::{encode, Frame, StatusEvent};

/// Strictly ordered word transport between the two execution contexts.
///
/// Frames are written under a writer lock so the two words of an address
/// frame always sit next to each other, even with more than one writer.
/// The reader side never takes that lock.
pub struct WordChannel<M: RawMutex, const N: usize> {
    words: Channel<M, u32, N>,
    writer: Mutex<M, ()>,
}

impl<M: RawMutex, const N: usize> WordChannel<M, N> {
    pub const fn new() -> Self {
        Self {
            words: Channel::new(),
            writer: Mutex::new(()),
        }
    }

    pub fn is_ready(&self) -> bool {
        !self.words.is_empty()
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn try_pop(&self) -> Option<u32> {
        self.words.try_receive().ok()
    }

    /// Waits for the next word. Only used once a frame is known to continue.
    pub async fn pop(&self) -> u32 {
        self.words.receive().await
    }

    pub async fn wait_ready(&self) {
        self.words.ready_to_receive().await
    }

    pub async fn push_frame(&self, frame: &Frame) {
        let _writer = self.writer.lock().await;
        for &word in frame.words() {
            self.words.send(word).await;
        }
    }

    #[cfg(test)]
    pub(crate) fn try_push_raw(&self, word: u32) -> bool {
        self.words.try_send(word).is_ok()
    }
}

impl<M: RawMutex, const N: usize> Default for WordChannel<M, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Producer handle that encodes events before they cross the channel.
pub struct EventSender<'a, M: RawMutex, const N: usize> {
    channel: &'a WordChannel<M, N>,
}

impl<M: RawMutex, const N: usize> Clone for EventSender<'_, M, N> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M: RawMutex, const N: usize> Copy for EventSender<'_, M, N> {}

impl<'a, M: RawMutex, const N: usize> EventSender<'a, M, N> {
    pub const fn new(channel: &'a WordChannel<M, N>) -> Self {
        Self { channel }
    }

    pub async fn send(&self, event: StatusEvent) {
        self.channel.push_frame(&encode(event)).await;
    }
}

/// Completion path of the publish client: every publish outcome comes back
/// to the consumer as a `PingAck` through the same channel as the
/// supervisor's status events.
pub struct AckReporter<'a, M: RawMutex, const N: usize> {
    sender: EventSender<'a, M, N>,
}

impl<M: RawMutex, const N: usize> Clone for AckReporter<'_, M, N> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M: RawMutex, const N: usize> Copy for AckReporter<'_, M, N> {}

impl<'a, M: RawMutex, const N: usize> AckReporter<'a, M, N> {
    pub const fn new(channel: &'a WordChannel<M, N>) -> Self {
        Self {
            sender: EventSender::new(channel),
        }
    }

    pub async fn report(&self, ok: bool) {
        self.sender.send(StatusEvent::PingAck { ok }).await;
    }
}

#[cfg(test)]
mod tests {
    use core::net::Ipv4Addr;

    use embassy_futures::{block_on, join::join3};
    use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

    use super::codec::{decode, decode_address, Decoded, LinkStatus};
    use super::*;

    type TestChannel = WordChannel<CriticalSectionRawMutex, 4>;

    #[test]
    fn frames_come_out_in_push_order() {
        let channel = TestChannel::new();
        let sender = EventSender::new(&channel);
        block_on(async {
            sender.send(StatusEvent::wifi(0, LinkStatus::Initializing)).await;
            sender
                .send(StatusEvent::IpAssigned {
                    addr: Ipv4Addr::new(10, 1, 2, 3),
                })
                .await;
        });

        assert_eq!(channel.len(), 3);
        assert!(channel.is_ready());
        let first = channel.try_pop().unwrap();
        assert_eq!(
            decode(first),
            Ok(Decoded::Event(StatusEvent::wifi(0, LinkStatus::Initializing)))
        );
        assert_eq!(decode(channel.try_pop().unwrap()), Ok(Decoded::AddressFollows));
        assert_eq!(
            decode_address(channel.try_pop().unwrap()),
            Ipv4Addr::new(10, 1, 2, 3)
        );
        assert!(!channel.is_ready());
        assert_eq!(channel.try_pop(), None);
    }

    #[test]
    fn address_frame_stays_whole_when_writers_contend() {
        let channel: WordChannel<CriticalSectionRawMutex, 2> = WordChannel::new();
        let status = EventSender::new(&channel);
        let acks = AckReporter::new(&channel);
        let addr = Ipv4Addr::new(192, 168, 0, 2);

        // The address frame fills the channel halfway through, so the ack
        // writer is parked on the lock until the reader makes room.
        let ((), (), words) = block_on(join3(
            async {
                status.send(StatusEvent::wifi(1, LinkStatus::Connected)).await;
                status.send(StatusEvent::IpAssigned { addr }).await;
            },
            acks.report(true),
            async {
                let mut words = [0u32; 4];
                for word in &mut words {
                    *word = channel.pop().await;
                }
                words
            },
        ));

        assert_eq!(
            decode(words[0]),
            Ok(Decoded::Event(StatusEvent::wifi(1, LinkStatus::Connected)))
        );
        assert_eq!(decode(words[1]), Ok(Decoded::AddressFollows));
        assert_eq!(decode_address(words[2]), addr);
        assert_eq!(
            decode(words[3]),
            Ok(Decoded::Event(StatusEvent::PingAck { ok: true }))
        );
        assert!(channel.is_empty());
    }
}
