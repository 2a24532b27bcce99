// Input handler module for terminal key presses
// Reads crossterm events and turns them into named key presses

pub mod keys;

pub use keys::KeyPress;

use crossterm::event::{Event, EventStream};
use futures_util::StreamExt;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

/// Starts reading the terminal on a background task. The receiver outlives
/// any one connection; the reader stops when it is dropped or the terminal
/// closes.
pub fn spawn_key_reader() -> UnboundedReceiver<KeyPress> {
    let (sender, receiver) = unbounded_channel();
    tokio::spawn(async move {
        let mut events = EventStream::new();
        while let Some(event) = events.next().await {
            match event {
                Ok(Event::Key(key)) => {
                    if let Some(press) = KeyPress::from_event(&key) {
                        if sender.send(press).is_err() {
                            break;
                        }
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    log::error!("[Session] Failed to read terminal input: {}", e);
                    break;
                }
            }
        }
    });
    receiver
}
