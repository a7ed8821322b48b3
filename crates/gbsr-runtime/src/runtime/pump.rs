use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::input::{EventSource, InputEvent};

use super::handle::EventSender;

const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Polls device event sources on their own thread and feeds the driving
/// loop's event queue. A source reporting quit forwards a quit event. The
/// pump stops by itself once the driving loop has exited.
pub struct EventPump {
    stop: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl EventPump {
    /// Spawns the pump. Sources are built on the pump thread, so they do not
    /// need to be `Send` themselves.
    pub fn spawn<F>(make_sources: F, events: EventSender) -> std::io::Result<Self>
    where
        F: FnOnce() -> Vec<Box<dyn EventSource>> + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);

        let join = thread::Builder::new()
            .name("gbsr-events".into())
            .spawn(move || {
                let mut sources = make_sources();
                pump(&mut sources, &events, &thread_stop);
            })?;

        Ok(Self {
            stop,
            join: Some(join),
        })
    }

    /// Whether the pump thread has exited.
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(JoinHandle::is_finished)
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(join) = self.join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for EventPump {
    fn drop(&mut self) {
        self.stop();
    }
}

fn pump(sources: &mut [Box<dyn EventSource>], events: &EventSender, stop: &AtomicBool) {
    let mut batch: Vec<InputEvent> = Vec::new();

    while !stop.load(Ordering::Acquire) {
        if !events.is_connected() {
            tracing::debug!("driving loop gone, event pump exiting");
            return;
        }

        let mut quit = false;
        for source in sources.iter_mut() {
            if !source.poll(&mut batch) {
                quit = true;
            }
        }

        for event in batch.drain(..) {
            if !events.send_input(event) {
                return;
            }
        }

        if quit {
            tracing::info!("event source requested quit");
            let _ = events.quit();
            return;
        }

        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{KeyCode, Modifiers};
    use crate::runtime::{state::RuntimeState, types::LoopEvent};
    use crossbeam_channel::bounded;
    use std::time::Duration;

    struct Scripted {
        batches: Vec<Vec<InputEvent>>,
    }

    impl EventSource for Scripted {
        fn poll(&mut self, out: &mut Vec<InputEvent>) -> bool {
            match self.batches.pop() {
                Some(batch) => {
                    out.extend(batch);
                    true
                }
                None => false,
            }
        }
    }

    #[test]
    fn forwards_events_then_quit() {
        let (tx, rx) = bounded(8);
        let sender = EventSender::new(tx, Arc::new(RuntimeState::new()));
        let key = InputEvent::Key {
            code: KeyCode::RETURN,
            down: true,
            modifiers: Modifiers::empty(),
        };

        let mut pump = EventPump::spawn(
            move || -> Vec<Box<dyn EventSource>> {
                vec![Box::new(Scripted {
                    batches: vec![vec![key]],
                })]
            },
            sender,
        )
        .unwrap();

        let timeout = Duration::from_secs(2);
        assert_eq!(rx.recv_timeout(timeout).unwrap(), LoopEvent::Input(key));
        assert_eq!(rx.recv_timeout(timeout).unwrap(), LoopEvent::Quit);
        pump.stop();
    }

    struct Quiet;

    impl EventSource for Quiet {
        fn poll(&mut self, _out: &mut Vec<InputEvent>) -> bool {
            true
        }
    }

    #[test]
    fn exits_once_the_driving_loop_stops() {
        let (tx, rx) = bounded(8);
        let state = Arc::new(RuntimeState::new());
        let pump = EventPump::spawn(
            || -> Vec<Box<dyn EventSource>> { vec![Box::new(Quiet)] },
            EventSender::new(tx, Arc::clone(&state)),
        )
        .unwrap();

        thread::sleep(Duration::from_millis(20));
        assert!(!pump.is_finished());

        state.running.store(false, Ordering::Release);
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while !pump.is_finished() {
            assert!(std::time::Instant::now() < deadline, "pump kept polling");
            thread::sleep(Duration::from_millis(5));
        }
        // Exiting on shutdown is not a quit request.
        assert!(rx.try_recv().is_err());
    }
}
