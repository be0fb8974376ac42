use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use app_use::driver::{
    driver_model::{Bounds, Driver, DriverCommand, RawNode},
    error::DriverError,
};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub const SCREEN_WIDTH: i32 = 1080;
pub const SCREEN_HEIGHT: i32 = 2400;

pub struct FakeState {
    /// Trees served by `fetch_tree`; the last one repeats forever.
    pub trees: VecDeque<RawNode>,
    pub screen: Bounds,
    pub connected: bool,
    pub fetch_errors: VecDeque<DriverError>,
    pub dispatch_results: VecDeque<Result<(), DriverError>>,
    pub dispatch_delay: Option<Duration>,
    pub fetch_delay: Option<Duration>,
    pub cancel_on_dispatch: Option<CancellationToken>,
    pub fetches: u32,
    pub dispatched: Vec<DriverCommand>,
    pub closed: bool,
}

/// Scriptable in-memory driver. Clones share state, so a test can keep one
/// handle for assertions while the loop owns another.
#[derive(Clone)]
pub struct FakeDriver {
    state: Arc<Mutex<FakeState>>,
}

impl FakeDriver {
    pub fn new(tree: RawNode) -> Self {
        Self::with_trees(vec![tree])
    }

    pub fn with_trees(trees: Vec<RawNode>) -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                trees: trees.into(),
                screen: Bounds::new(0, 0, SCREEN_WIDTH, SCREEN_HEIGHT),
                connected: true,
                fetch_errors: VecDeque::new(),
                dispatch_results: VecDeque::new(),
                dispatch_delay: None,
                fetch_delay: None,
                cancel_on_dispatch: None,
                fetches: 0,
                dispatched: Vec::new(),
                closed: false,
            })),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn push_tree(&self, tree: RawNode) {
        self.state().trees.push_back(tree);
    }

    pub fn set_connected(&self, connected: bool) {
        self.state().connected = connected;
    }

    pub fn fail_next_fetch(&self, error: DriverError) {
        self.state().fetch_errors.push_back(error);
    }

    pub fn script_dispatch(&self, results: Vec<Result<(), DriverError>>) {
        self.state().dispatch_results.extend(results);
    }

    pub fn set_dispatch_delay(&self, delay: Duration) {
        self.state().dispatch_delay = Some(delay);
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        self.state().fetch_delay = Some(delay);
    }

    /// Cancel `token` the moment a command reaches the driver.
    pub fn cancel_on_dispatch(&self, token: CancellationToken) {
        self.state().cancel_on_dispatch = Some(token);
    }

    pub fn fetches(&self) -> u32 {
        self.state().fetches
    }

    pub fn dispatched(&self) -> Vec<DriverCommand> {
        self.state().dispatched.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }
}

#[async_trait]
impl Driver for FakeDriver {
    async fn is_connected(&mut self) -> bool {
        self.state().connected
    }

    async fn fetch_tree(&mut self) -> Result<RawNode, DriverError> {
        let delay = {
            let mut state = self.state();
            state.fetches += 1;
            state.fetch_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        if let Some(error) = state.fetch_errors.pop_front() {
            return Err(error);
        }
        if state.trees.len() > 1 {
            return Ok(state.trees.pop_front().unwrap());
        }
        state
            .trees
            .front()
            .cloned()
            .ok_or_else(|| DriverError::Protocol("no tree scripted".into()))
    }

    async fn screen_size(&mut self) -> Result<Bounds, DriverError> {
        Ok(self.state().screen)
    }

    async fn dispatch(&mut self, command: &DriverCommand) -> Result<(), DriverError> {
        let delay = {
            let mut state = self.state();
            state.dispatched.push(command.clone());
            if let Some(token) = &state.cancel_on_dispatch {
                token.cancel();
            }
            state.dispatch_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.state().dispatch_results.pop_front().unwrap_or(Ok(()))
    }

    async fn close(&mut self) {
        self.state().closed = true;
    }
}
