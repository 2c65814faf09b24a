use std::time::Duration;
use tokio::sync::mpsc;

/// Events driving the follow loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
  /// Periodic tick for applying background results
  Tick,
  /// The user pressed Ctrl-C
  Interrupt,
}

/// Event handler that produces events from a tick timer and the interrupt signal
pub struct EventHandler {
  rx: mpsc::UnboundedReceiver<Event>,
}

impl EventHandler {
  /// Create a new event handler with the given tick rate
  pub fn new(tick_rate: Duration) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
      let mut interval = tokio::time::interval(tick_rate);
      loop {
        tokio::select! {
          _ = interval.tick() => {
            if tx.send(Event::Tick).is_err() {
              break;
            }
          }
          result = tokio::signal::ctrl_c() => {
            if result.is_ok() {
              let _ = tx.send(Event::Interrupt);
            }
            break;
          }
        }
      }
    });

    Self { rx }
  }

  /// Handler fed only by the returned sender, with no timer or signal.
  #[cfg(test)]
  pub fn manual() -> (Self, mpsc::UnboundedSender<Event>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Self { rx }, tx)
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<Event> {
    self.rx.recv().await
  }
}
