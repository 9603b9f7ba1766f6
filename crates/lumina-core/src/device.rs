use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::watch;

use crate::errors::DeviceFailure;
use crate::media::{CameraBackend, CaptureConstraints};

/// Lifecycle of the preview camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePhase {
    Idle,
    Acquiring,
    Active,
}

/// What the preview surface should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewState {
    pub video_requested: bool,
    pub phase: CapturePhase,
    pub error: Option<DeviceFailure>,
}

impl PreviewState {
    fn idle() -> Self {
        Self {
            video_requested: false,
            phase: CapturePhase::Idle,
            error: None,
        }
    }
}

struct Inner<B: CameraBackend> {
    alive: bool,
    video_requested: bool,
    /// Generation of the acquisition whose result may still be published.
    pending: Option<u64>,
    next_generation: u64,
    handle: Option<B::Handle>,
    sinks: Vec<B::Sink>,
    error: Option<DeviceFailure>,
}

impl<B: CameraBackend> Inner<B> {
    fn state(&self) -> PreviewState {
        let phase = if self.handle.is_some() {
            CapturePhase::Active
        } else if self.pending.is_some() {
            CapturePhase::Acquiring
        } else {
            CapturePhase::Idle
        };
        PreviewState {
            video_requested: self.video_requested,
            phase,
            error: self.error.clone(),
        }
    }

    /// Take the capture out of the manager, detaching it from every sink.
    fn take_detached(&mut self, backend: &B) -> Option<B::Handle> {
        let handle = self.handle.take()?;
        for sink in &self.sinks {
            if let Err(e) = backend.detach(&handle, sink) {
                tracing::warn!("failed to detach camera from sink: {e}");
            }
        }
        Some(handle)
    }
}

struct Shared<B: CameraBackend> {
    backend: Arc<B>,
    constraints: CaptureConstraints,
    runtime: Handle,
    inner: Mutex<Inner<B>>,
    state_tx: watch::Sender<PreviewState>,
}

impl<B: CameraBackend> Shared<B> {
    fn lock(&self) -> MutexGuard<'_, Inner<B>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, inner: &Inner<B>) {
        self.state_tx.send_replace(inner.state());
    }

    async fn release(&self, handle: B::Handle) {
        if let Err(e) = self.backend.release(handle).await {
            tracing::warn!("failed to release camera: {e}");
        }
    }

    async fn complete_acquisition(&self, generation: u64, result: Result<B::Handle, DeviceFailure>) {
        match result {
            Ok(handle) => {
                let discarded = {
                    let mut inner = self.lock();
                    if inner.alive && inner.pending == Some(generation) && inner.handle.is_none() {
                        inner.pending = None;
                        for sink in &inner.sinks {
                            if let Err(e) = self.backend.attach(&handle, sink) {
                                tracing::warn!("failed to attach camera to sink: {e}");
                            }
                        }
                        inner.handle = Some(handle);
                        self.publish(&inner);
                        tracing::info!("camera preview active");
                        None
                    } else {
                        Some(handle)
                    }
                };
                if let Some(handle) = discarded {
                    tracing::info!("camera acquired after stop, releasing it (generation {generation})");
                    self.release(handle).await;
                }
            }
            Err(failure) => {
                let failure = if self.backend.is_secure_context() {
                    failure
                } else {
                    DeviceFailure::InsecureContext
                };
                let mut inner = self.lock();
                if inner.alive && inner.pending == Some(generation) {
                    tracing::warn!("failed to acquire camera: {failure}");
                    inner.pending = None;
                    inner.video_requested = false;
                    inner.error = Some(failure);
                    self.publish(&inner);
                } else {
                    tracing::debug!("stale camera acquisition failed: {failure}");
                }
            }
        }
    }
}

/// Owns the local preview camera from the first toggle until disposal.
///
/// Toggles are state setters, so calling them repeatedly never queues
/// extra work. At most one capture exists at a time. An acquisition that
/// resolves after the camera was switched off, handed off or disposed is
/// released straight away and never attached to a sink.
///
/// Operations that start or release hardware spawn onto the runtime captured
/// at construction, so toggles may be called from any thread.
pub struct DeviceSessionManager<B: CameraBackend> {
    shared: Arc<Shared<B>>,
}

impl<B: CameraBackend> Clone for DeviceSessionManager<B> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<B: CameraBackend> DeviceSessionManager<B> {
    /// Must be called from within a tokio runtime; see [`Self::with_runtime`]
    /// otherwise.
    pub fn new(backend: Arc<B>) -> Self {
        Self::with_constraints(backend, CaptureConstraints::default())
    }

    /// Must be called from within a tokio runtime.
    pub fn with_constraints(backend: Arc<B>, constraints: CaptureConstraints) -> Self {
        Self::with_runtime(backend, constraints, Handle::current())
    }

    pub fn with_runtime(backend: Arc<B>, constraints: CaptureConstraints, runtime: Handle) -> Self {
        let (state_tx, _) = watch::channel(PreviewState::idle());
        Self {
            shared: Arc::new(Shared {
                backend,
                constraints,
                runtime,
                inner: Mutex::new(Inner {
                    alive: true,
                    video_requested: false,
                    pending: None,
                    next_generation: 0,
                    handle: None,
                    sinks: Vec::new(),
                    error: None,
                }),
                state_tx,
            }),
        }
    }

    pub fn state(&self) -> PreviewState {
        self.shared.lock().state()
    }

    /// Follow state changes, e.g. to re-render the preview.
    pub fn subscribe(&self) -> watch::Receiver<PreviewState> {
        self.shared.state_tx.subscribe()
    }

    pub fn is_disposed(&self) -> bool {
        !self.shared.lock().alive
    }

    pub fn set_video_requested(&self, requested: bool) {
        let mut inner = self.shared.lock();
        if !inner.alive {
            tracing::debug!("set_video_requested({requested}) after dispose ignored");
            return;
        }

        if requested {
            inner.video_requested = true;
            if inner.handle.is_some() || inner.pending.is_some() {
                tracing::debug!("camera already active or acquiring");
                return;
            }
            let generation = inner.next_generation;
            inner.next_generation += 1;
            inner.pending = Some(generation);
            inner.error = None;
            self.shared.publish(&inner);
            drop(inner);

            tracing::info!("acquiring camera (generation {generation})");
            let shared = self.shared.clone();
            self.shared.runtime.spawn(async move {
                let result = shared.backend.acquire(shared.constraints).await;
                shared.complete_acquisition(generation, result).await;
            });
        } else {
            if !inner.video_requested && inner.handle.is_none() && inner.pending.is_none() {
                return;
            }
            inner.video_requested = false;
            inner.pending = None;
            inner.error = None;
            let handle = inner.take_detached(&self.shared.backend);
            self.shared.publish(&inner);
            drop(inner);

            if let Some(handle) = handle {
                tracing::info!("stopping camera preview");
                let shared = self.shared.clone();
                self.shared.runtime.spawn(async move { shared.release(handle).await });
            }
        }
    }

    /// Register a rendering surface. An existing capture is attached to it
    /// right away without touching the hardware again.
    pub fn attach_sink(&self, sink: B::Sink) {
        let mut inner = self.shared.lock();
        if !inner.alive {
            return;
        }
        if let Some(handle) = &inner.handle {
            if let Err(e) = self.shared.backend.attach(handle, &sink) {
                tracing::warn!("failed to attach camera to sink: {e}");
            }
        }
        if !inner.sinks.contains(&sink) {
            inner.sinks.push(sink);
        }
    }

    pub fn detach_sink(&self, sink: &B::Sink) {
        let mut inner = self.shared.lock();
        let Some(pos) = inner.sinks.iter().position(|s| s == sink) else {
            return;
        };
        let sink = inner.sinks.remove(pos);
        if let Some(handle) = &inner.handle {
            if let Err(e) = self.shared.backend.detach(handle, &sink) {
                tracing::warn!("failed to detach camera from sink: {e}");
            }
        }
    }

    /// Free the camera so another consumer (the live session) can open it.
    ///
    /// The requested flag is left as is; it is what gets forwarded to the
    /// join. Any acquisition still in flight is discarded when it resolves.
    pub async fn release_for_handoff(&self) {
        if let Some(handle) = self.take_for_handoff() {
            tracing::info!("handing camera off");
            self.shared.release(handle).await;
        }
    }

    /// Like [`Self::release_for_handoff`] but returns once the preview is
    /// detached; the hardware release finishes in the background.
    pub fn hand_off(&self) {
        if let Some(handle) = self.take_for_handoff() {
            tracing::info!("handing camera off");
            let shared = self.shared.clone();
            self.shared.runtime.spawn(async move { shared.release(handle).await });
        }
    }

    fn take_for_handoff(&self) -> Option<B::Handle> {
        let mut inner = self.shared.lock();
        inner.pending = None;
        let handle = inner.take_detached(&self.shared.backend);
        self.shared.publish(&inner);
        handle
    }

    /// Permanent teardown. Releases the camera whatever the requested state.
    pub async fn dispose(&self) {
        let handle = {
            let mut inner = self.shared.lock();
            if !inner.alive {
                return;
            }
            inner.alive = false;
            inner.pending = None;
            let handle = inner.take_detached(&self.shared.backend);
            inner.sinks.clear();
            self.shared.publish(&inner);
            handle
        };
        tracing::info!("device session disposed");
        if let Some(handle) = handle {
            self.shared.release(handle).await;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::errors::LuminaError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::{mpsc, oneshot};

    type Gate = oneshot::Sender<Result<(), DeviceFailure>>;

    pub(crate) struct MockCamera {
        pub acquires: AtomicUsize,
        pub releases: AtomicUsize,
        pub detaches: AtomicUsize,
        pub attached: Mutex<Vec<(u32, &'static str)>>,
        pub last_constraints: Mutex<Option<CaptureConstraints>>,
        pub fail_release: AtomicBool,
        pub fail_detach: AtomicBool,
        gates: Mutex<VecDeque<oneshot::Receiver<Result<(), DeviceFailure>>>>,
        release_gates: Mutex<VecDeque<oneshot::Receiver<()>>>,
        released_tx: mpsc::UnboundedSender<u32>,
        secure: bool,
    }

    impl MockCamera {
        pub(crate) fn new(secure: bool) -> (Arc<Self>, mpsc::UnboundedReceiver<u32>) {
            let (released_tx, released_rx) = mpsc::unbounded_channel();
            let camera = Arc::new(Self {
                acquires: AtomicUsize::new(0),
                releases: AtomicUsize::new(0),
                detaches: AtomicUsize::new(0),
                attached: Mutex::new(Vec::new()),
                last_constraints: Mutex::new(None),
                fail_release: AtomicBool::new(false),
                fail_detach: AtomicBool::new(false),
                gates: Mutex::new(VecDeque::new()),
                release_gates: Mutex::new(VecDeque::new()),
                released_tx,
                secure,
            });
            (camera, released_rx)
        }

        /// Hold the next acquisition until the returned sender fires.
        pub(crate) fn gate_next(&self) -> Gate {
            let (tx, rx) = oneshot::channel();
            self.gates.lock().unwrap().push_back(rx);
            tx
        }

        /// Hold the next release until the returned sender fires.
        pub(crate) fn gate_next_release(&self) -> oneshot::Sender<()> {
            let (tx, rx) = oneshot::channel();
            self.release_gates.lock().unwrap().push_back(rx);
            tx
        }

        fn attach_count(&self) -> usize {
            self.attached.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl CameraBackend for MockCamera {
        type Handle = u32;
        type Sink = &'static str;

        async fn acquire(&self, constraints: CaptureConstraints) -> Result<u32, DeviceFailure> {
            *self.last_constraints.lock().unwrap() = Some(constraints);
            let id = self.acquires.fetch_add(1, Ordering::SeqCst) as u32 + 1;
            let gate = self.gates.lock().unwrap().pop_front();
            match gate {
                Some(rx) => match rx.await {
                    Ok(Ok(())) => Ok(id),
                    Ok(Err(failure)) => Err(failure),
                    Err(_) => Err(DeviceFailure::Other("gate dropped".into())),
                },
                None => Ok(id),
            }
        }

        fn attach(&self, handle: &u32, sink: &&'static str) -> Result<(), LuminaError> {
            self.attached.lock().unwrap().push((*handle, *sink));
            Ok(())
        }

        fn detach(&self, _handle: &u32, _sink: &&'static str) -> Result<(), LuminaError> {
            self.detaches.fetch_add(1, Ordering::SeqCst);
            if self.fail_detach.load(Ordering::SeqCst) {
                return Err(LuminaError::Room("surface already destroyed".into()));
            }
            Ok(())
        }

        async fn release(&self, handle: u32) -> Result<(), LuminaError> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            let _ = self.released_tx.send(handle);
            let gate = self.release_gates.lock().unwrap().pop_front();
            if let Some(rx) = gate {
                let _ = rx.await;
            }
            if self.fail_release.load(Ordering::SeqCst) {
                return Err(LuminaError::Room("camera busy".into()));
            }
            Ok(())
        }

        fn is_secure_context(&self) -> bool {
            self.secure
        }
    }

    async fn wait_for_phase(mgr: &DeviceSessionManager<MockCamera>, phase: CapturePhase) {
        let mut rx = mgr.subscribe();
        tokio::time::timeout(Duration::from_secs(1), rx.wait_for(|s| s.phase == phase))
            .await
            .expect("timed out waiting for phase")
            .expect("state channel closed");
    }

    async fn wait_released(rx: &mut mpsc::UnboundedReceiver<u32>) -> u32 {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for release")
            .expect("release channel closed")
    }

    #[tokio::test]
    async fn repeated_request_acquires_once() {
        let (camera, _released) = MockCamera::new(true);
        let mgr = DeviceSessionManager::new(camera.clone());

        mgr.set_video_requested(true);
        mgr.set_video_requested(true);
        wait_for_phase(&mgr, CapturePhase::Active).await;
        mgr.set_video_requested(true);

        assert_eq!(camera.acquires.load(Ordering::SeqCst), 1);
        assert!(mgr.state().video_requested);
    }

    #[tokio::test]
    async fn stop_before_acquisition_resolves_releases_without_attaching() {
        let (camera, mut released) = MockCamera::new(true);
        let mgr = DeviceSessionManager::new(camera.clone());
        mgr.attach_sink("preview");
        let gate = camera.gate_next();

        mgr.set_video_requested(true);
        assert_eq!(mgr.state().phase, CapturePhase::Acquiring);
        mgr.set_video_requested(false);
        gate.send(Ok(())).unwrap();

        assert_eq!(wait_released(&mut released).await, 1);
        assert_eq!(camera.acquires.load(Ordering::SeqCst), 1);
        assert_eq!(camera.releases.load(Ordering::SeqCst), 1);
        assert_eq!(camera.attach_count(), 0);
        let state = mgr.state();
        assert!(!state.video_requested);
        assert_eq!(state.phase, CapturePhase::Idle);
    }

    #[tokio::test]
    async fn dispose_during_acquisition_leaves_no_open_camera() {
        let (camera, mut released) = MockCamera::new(true);
        let mgr = DeviceSessionManager::new(camera.clone());
        mgr.attach_sink("preview");
        let gate = camera.gate_next();

        mgr.set_video_requested(true);
        mgr.dispose().await;
        gate.send(Ok(())).unwrap();

        assert_eq!(wait_released(&mut released).await, 1);
        assert_eq!(camera.acquires.load(Ordering::SeqCst), 1);
        assert_eq!(camera.releases.load(Ordering::SeqCst), 1);
        assert_eq!(camera.attach_count(), 0);
        assert!(mgr.is_disposed());
    }

    #[tokio::test]
    async fn dispose_releases_active_camera_regardless_of_request() {
        let (camera, _released) = MockCamera::new(true);
        let mgr = DeviceSessionManager::new(camera.clone());
        mgr.set_video_requested(true);
        wait_for_phase(&mgr, CapturePhase::Active).await;
        mgr.attach_sink("preview");

        mgr.dispose().await;
        mgr.dispose().await;

        assert_eq!(camera.releases.load(Ordering::SeqCst), 1);
        assert_eq!(camera.detaches.load(Ordering::SeqCst), 1);
        assert_eq!(mgr.state().phase, CapturePhase::Idle);
    }

    #[tokio::test]
    async fn toggling_off_detaches_and_releases() {
        let (camera, mut released) = MockCamera::new(true);
        let mgr = DeviceSessionManager::new(camera.clone());
        mgr.attach_sink("preview");
        mgr.set_video_requested(true);
        wait_for_phase(&mgr, CapturePhase::Active).await;
        assert_eq!(*camera.attached.lock().unwrap(), vec![(1, "preview")]);

        mgr.set_video_requested(false);
        assert_eq!(mgr.state().phase, CapturePhase::Idle);

        assert_eq!(wait_released(&mut released).await, 1);
        assert_eq!(camera.detaches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn permission_failure_resets_request_and_reports_guidance() {
        let (camera, _released) = MockCamera::new(true);
        let mgr = DeviceSessionManager::new(camera.clone());
        let gate = camera.gate_next();

        mgr.set_video_requested(true);
        gate.send(Err(DeviceFailure::PermissionDenied)).unwrap();
        wait_for_phase(&mgr, CapturePhase::Idle).await;

        let state = mgr.state();
        assert!(!state.video_requested);
        assert_eq!(state.error, Some(DeviceFailure::PermissionDenied));
        assert_eq!(
            state.error.unwrap().guidance(),
            "Camera permission denied or device not found."
        );
    }

    #[tokio::test]
    async fn failure_in_insecure_context_is_reported_as_such() {
        let (camera, _released) = MockCamera::new(false);
        let mgr = DeviceSessionManager::new(camera.clone());
        let gate = camera.gate_next();

        mgr.set_video_requested(true);
        gate.send(Err(DeviceFailure::NotFound)).unwrap();
        wait_for_phase(&mgr, CapturePhase::Idle).await;

        let error = mgr.state().error.expect("error recorded");
        assert!(error.is_insecure_context());
    }

    #[tokio::test]
    async fn retry_after_failure_clears_error() {
        let (camera, _released) = MockCamera::new(true);
        let mgr = DeviceSessionManager::new(camera.clone());
        let gate = camera.gate_next();
        mgr.set_video_requested(true);
        gate.send(Err(DeviceFailure::NotFound)).unwrap();
        wait_for_phase(&mgr, CapturePhase::Idle).await;

        mgr.set_video_requested(true);
        assert_eq!(mgr.state().error, None);
        wait_for_phase(&mgr, CapturePhase::Active).await;
        assert_eq!(camera.acquires.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn remount_reattaches_without_reacquiring() {
        let (camera, _released) = MockCamera::new(true);
        let mgr = DeviceSessionManager::new(camera.clone());
        mgr.set_video_requested(true);
        wait_for_phase(&mgr, CapturePhase::Active).await;

        mgr.attach_sink("preview");
        mgr.detach_sink(&"preview");
        mgr.attach_sink("preview");

        assert_eq!(camera.acquires.load(Ordering::SeqCst), 1);
        assert_eq!(camera.attach_count(), 2);
        assert_eq!(camera.detaches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn handoff_releases_but_keeps_request() {
        let (camera, _released) = MockCamera::new(true);
        let mgr = DeviceSessionManager::new(camera.clone());

        mgr.release_for_handoff().await;
        assert_eq!(camera.releases.load(Ordering::SeqCst), 0);

        mgr.set_video_requested(true);
        wait_for_phase(&mgr, CapturePhase::Active).await;
        mgr.release_for_handoff().await;

        assert_eq!(camera.releases.load(Ordering::SeqCst), 1);
        let state = mgr.state();
        assert!(state.video_requested);
        assert_eq!(state.phase, CapturePhase::Idle);
    }

    #[tokio::test]
    async fn off_then_on_while_pending_keeps_only_latest_capture() {
        let (camera, mut released) = MockCamera::new(true);
        let mgr = DeviceSessionManager::new(camera.clone());
        mgr.attach_sink("preview");
        let first = camera.gate_next();
        let second = camera.gate_next();

        mgr.set_video_requested(true);
        mgr.set_video_requested(false);
        mgr.set_video_requested(true);
        tokio::task::yield_now().await;

        first.send(Ok(())).unwrap();
        assert_eq!(wait_released(&mut released).await, 1);
        second.send(Ok(())).unwrap();
        wait_for_phase(&mgr, CapturePhase::Active).await;

        assert_eq!(camera.acquires.load(Ordering::SeqCst), 2);
        assert_eq!(camera.releases.load(Ordering::SeqCst), 1);
        assert_eq!(*camera.attached.lock().unwrap(), vec![(2, "preview")]);
    }

    #[tokio::test]
    async fn requests_after_dispose_are_ignored() {
        let (camera, _released) = MockCamera::new(true);
        let mgr = DeviceSessionManager::new(camera.clone());
        mgr.dispose().await;

        mgr.set_video_requested(true);
        tokio::task::yield_now().await;

        assert_eq!(camera.acquires.load(Ordering::SeqCst), 0);
        assert!(!mgr.state().video_requested);
    }

    #[tokio::test]
    async fn failed_release_on_toggle_off_is_swallowed() {
        let (camera, mut released) = MockCamera::new(true);
        camera.fail_release.store(true, Ordering::SeqCst);
        let mgr = DeviceSessionManager::new(camera.clone());
        mgr.set_video_requested(true);
        wait_for_phase(&mgr, CapturePhase::Active).await;

        mgr.set_video_requested(false);
        assert_eq!(wait_released(&mut released).await, 1);
        tokio::task::yield_now().await;

        assert_eq!(camera.releases.load(Ordering::SeqCst), 1);
        assert_eq!(mgr.state().phase, CapturePhase::Idle);
        assert_eq!(mgr.state().error, None);
    }

    #[tokio::test]
    async fn failed_release_on_handoff_is_swallowed() {
        let (camera, _released) = MockCamera::new(true);
        camera.fail_release.store(true, Ordering::SeqCst);
        camera.fail_detach.store(true, Ordering::SeqCst);
        let mgr = DeviceSessionManager::new(camera.clone());
        mgr.attach_sink("preview");
        mgr.set_video_requested(true);
        wait_for_phase(&mgr, CapturePhase::Active).await;

        mgr.release_for_handoff().await;

        assert_eq!(camera.detaches.load(Ordering::SeqCst), 1);
        assert_eq!(camera.releases.load(Ordering::SeqCst), 1);
        assert_eq!(mgr.state().phase, CapturePhase::Idle);
        assert!(mgr.state().video_requested);
    }

    #[tokio::test]
    async fn failed_release_on_dispose_is_swallowed() {
        let (camera, _released) = MockCamera::new(true);
        camera.fail_release.store(true, Ordering::SeqCst);
        let mgr = DeviceSessionManager::new(camera.clone());
        mgr.set_video_requested(true);
        wait_for_phase(&mgr, CapturePhase::Active).await;

        mgr.dispose().await;

        assert_eq!(camera.releases.load(Ordering::SeqCst), 1);
        assert_eq!(mgr.state().phase, CapturePhase::Idle);
        assert!(mgr.is_disposed());
    }

    #[tokio::test]
    async fn hand_off_returns_before_release_completes() {
        let (camera, mut released) = MockCamera::new(true);
        let mgr = DeviceSessionManager::new(camera.clone());
        mgr.set_video_requested(true);
        wait_for_phase(&mgr, CapturePhase::Active).await;
        let hold = camera.gate_next_release();

        mgr.hand_off();
        assert_eq!(mgr.state().phase, CapturePhase::Idle);

        assert_eq!(wait_released(&mut released).await, 1);
        hold.send(()).unwrap();
    }

    #[test]
    fn toggles_from_a_foreign_thread_spawn_on_captured_runtime() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let (camera, _released) = MockCamera::new(true);
        let mgr = DeviceSessionManager::with_runtime(
            camera.clone(),
            CaptureConstraints::default(),
            runtime.handle().clone(),
        );

        let ui = mgr.clone();
        std::thread::spawn(move || ui.set_video_requested(true))
            .join()
            .unwrap();

        runtime.block_on(wait_for_phase(&mgr, CapturePhase::Active));
        assert_eq!(camera.acquires.load(Ordering::SeqCst), 1);
    }
}
