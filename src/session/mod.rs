//! Crop session controller.
//!
//! A [`CropSession`] owns everything one crop invocation touches: the source
//! image, the display transform, the crop box, its mask and its history. All
//! gestures run synchronously on the owning thread. Decode and extraction can
//! be split into a request and a completion (`begin_load`/`complete_load`,
//! `begin_commit`/`finish_commit`) or run on a background worker via
//! `start_decode`/`start_commit` + `poll`. Completions carry a ticket; a
//! ticket from an earlier load, commit or a cancelled session is dropped.

pub mod clock;
mod failure;
pub mod worker;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::RgbaImage;

use crate::config::CropConfig;
use crate::crop::{
    apply_aspect_ratio, constrain, initial_crop_box, move_by, move_to, resize_from_handle,
    ChangedDimension, CropBox, CropHit, CropLimits, CropPreset, ResizeHandle, NOOP_EPSILON,
};
use crate::extract::{
    extract, CroppedImage, DecodeError, DecodeResult, ExtractResult, ImageDecoder, ImageSource,
};
use crate::geometry::{PixelRect, Point, Rect, Size};
use crate::history::{CropHistory, Debouncer, FrameThrottle, HistoryEntry};
use crate::mapping::{snap_to_pixels, DisplayTransform};
use crate::mask::{MaskCompositor, MaskSurface};
use crate::state::{SessionEvent, SessionState, StateMachine};

pub use clock::{Clock, ManualClock, SystemClock};
pub use failure::{FailureKind, SessionFailure};
use worker::{spawn_worker, WorkerHandle, WorkerPoll};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "crop-{}", self.0)
    }
}

/// Identifies one outstanding decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadTicket {
    session: SessionId,
    generation: u64,
}

/// Identifies one outstanding commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitTicket {
    session: SessionId,
    generation: u64,
}

/// Everything an extraction needs, detached from the session.
#[derive(Debug, Clone)]
pub struct CommitRequest {
    pub ticket: CommitTicket,
    pub region: PixelRect,
    pub source: ImageSource,
}

/// What a gesture did to the crop box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureOutcome {
    /// The box changed; the mask is already rebuilt.
    Applied,
    /// The gesture resolved to the current box, or there was nothing to undo/redo.
    Unchanged,
    /// The session is not in a state that accepts this gesture.
    Ignored,
}

impl GestureOutcome {
    pub const fn is_applied(self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// Whether an async completion was applied or dropped as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Applied,
    Stale,
}

/// The loaded image. `display` is what the host draws, scaled by the transform.
#[derive(Debug, Clone)]
pub struct ImageRef {
    pub source: ImageSource,
    pub native_width: u32,
    pub native_height: u32,
    pub display: RgbaImage,
}

impl ImageRef {
    pub fn native_size(&self) -> Size {
        Size::new(f64::from(self.native_width), f64::from(self.native_height))
    }
}

#[derive(Debug, Clone, Copy)]
struct DragState {
    hit: CropHit,
    start: Point,
    origin: CropBox,
}

enum PendingJob {
    Decode(LoadTicket, WorkerHandle<DecodeResult<RgbaImage>>),
    Commit(CommitTicket, WorkerHandle<ExtractResult<CroppedImage>>),
}

type CompleteCallback = Box<dyn FnOnce(CroppedImage)>;
type CancelCallback = Box<dyn FnOnce()>;
type FailureCallback = Box<dyn FnMut(&SessionFailure)>;

pub struct CropSession {
    id: SessionId,
    config: CropConfig,
    machine: StateMachine,
    generation: u64,
    source: ImageSource,
    image: Option<ImageRef>,
    viewport: Size,
    transform: DisplayTransform,
    crop_box: Option<CropBox>,
    revision: u64,
    initial: Option<HistoryEntry>,
    drag: Option<DragState>,
    mask: MaskCompositor,
    history: CropHistory,
    pending_history: Debouncer<HistoryEntry>,
    throttle: FrameThrottle,
    pending: Option<PendingJob>,
    failure: Option<SessionFailure>,
    on_crop_complete: Option<CompleteCallback>,
    on_cancel: Option<CancelCallback>,
    on_failure: Option<FailureCallback>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for CropSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CropSession")
            .field("id", &self.id)
            .field("state", &self.machine.state())
            .field("source", &self.source.describe())
            .field("crop_box", &self.crop_box)
            .field("revision", &self.revision)
            .field("failure", &self.failure)
            .finish_non_exhaustive()
    }
}

impl CropSession {
    /// Creates a session in `Loading`. Nothing is decoded until a load is started.
    pub fn new(source: ImageSource, viewport: Size, config: CropConfig) -> Self {
        Self::with_clock(source, viewport, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        source: ImageSource,
        viewport: Size,
        config: CropConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let config = config.normalized();
        let id = SessionId::next();
        tracing::info!(session = %id, source = %source.describe(), "crop session created");
        Self {
            id,
            mask: MaskCompositor::new(config.mask.mode, config.mask.rgba(), viewport),
            history: CropHistory::new(config.history_capacity),
            pending_history: Debouncer::new(config.history_quiet_period()),
            throttle: FrameThrottle::new(config.frame_interval()),
            config,
            machine: StateMachine::new(),
            generation: 0,
            source,
            image: None,
            viewport,
            transform: DisplayTransform::identity(),
            crop_box: None,
            revision: 0,
            initial: None,
            drag: None,
            pending: None,
            failure: None,
            on_crop_complete: None,
            on_cancel: None,
            on_failure: None,
            clock,
        }
    }

    /// Called at most once, with the cropped image, when a commit succeeds.
    pub fn on_crop_complete(&mut self, callback: impl FnOnce(CroppedImage) + 'static) {
        self.on_crop_complete = Some(Box::new(callback));
    }

    /// Called at most once, after the session has reached `Closed` through
    /// [`cancel`](Self::cancel).
    pub fn on_cancel(&mut self, callback: impl FnOnce() + 'static) {
        self.on_cancel = Some(Box::new(callback));
    }

    pub fn on_failure(&mut self, callback: impl FnMut(&SessionFailure) + 'static) {
        self.on_failure = Some(Box::new(callback));
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.machine.state()
    }

    pub fn state_machine(&self) -> &StateMachine {
        &self.machine
    }

    pub fn config(&self) -> &CropConfig {
        &self.config
    }

    pub fn source(&self) -> &ImageSource {
        &self.source
    }

    pub fn image(&self) -> Option<&ImageRef> {
        self.image.as_ref()
    }

    pub fn viewport(&self) -> Size {
        self.viewport
    }

    pub fn transform(&self) -> DisplayTransform {
        self.transform
    }

    pub fn crop_box(&self) -> Option<CropBox> {
        self.crop_box
    }

    /// Bumped on every accepted box change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn history(&self) -> &CropHistory {
        &self.history
    }

    pub fn failure(&self) -> Option<&SessionFailure> {
        self.failure.as_ref()
    }

    pub fn mask(&self) -> &MaskCompositor {
        &self.mask
    }

    /// Wheel zoom and pan are suspended while a drag is in progress.
    pub fn viewport_interaction_enabled(&self) -> bool {
        self.state() != SessionState::Cropping
    }

    pub fn has_pending_job(&self) -> bool {
        self.pending.is_some()
    }

    /// The crop box in native pixel coordinates, unsnapped.
    pub fn native_crop_rect(&self) -> Option<Rect> {
        self.crop_box
            .map(|crop_box| self.transform.rect_to_native(crop_box.rect()))
    }

    /// The whole-pixel region a commit would extract.
    pub fn pixel_region(&self) -> Option<PixelRect> {
        let image = self.image.as_ref()?;
        let native = self.native_crop_rect()?;
        Some(snap_to_pixels(native, image.native_width, image.native_height))
    }

    fn limits(&self) -> Option<CropLimits> {
        let image = self.image.as_ref()?;
        let min = self.config.min_crop_size.as_size().scaled(self.transform.scale());
        Some(CropLimits::new(
            self.transform.image_bounds(image.native_size()),
            min,
        ))
    }

    // Loading

    /// Starts a load. Returns `None` unless the session is still `Loading`.
    ///
    /// A new ticket invalidates every earlier one.
    pub fn begin_load(&mut self) -> Option<LoadTicket> {
        if self.state() != SessionState::Loading {
            tracing::debug!(session = %self.id, state = ?self.state(), "load not started");
            return None;
        }
        self.generation += 1;
        Some(LoadTicket {
            session: self.id,
            generation: self.generation,
        })
    }

    fn load_ticket_is_live(&self, ticket: LoadTicket) -> bool {
        ticket.session == self.id
            && ticket.generation == self.generation
            && self.state() == SessionState::Loading
    }

    /// Applies a finished decode. Stale tickets are dropped without touching the session.
    pub fn complete_load(
        &mut self,
        ticket: LoadTicket,
        result: DecodeResult<RgbaImage>,
    ) -> Delivery {
        if !self.load_ticket_is_live(ticket) {
            tracing::warn!(
                session = %self.id,
                state = ?self.state(),
                "dropping late decode result"
            );
            return Delivery::Stale;
        }
        let result = result.and_then(|image| {
            if image.width() == 0 || image.height() == 0 {
                Err(DecodeError::EmptyImage)
            } else {
                Ok(image)
            }
        });
        match result {
            Ok(image) => self.install_image(image),
            Err(err) => {
                let failure = SessionFailure::from_error(FailureKind::Decode, &err);
                self.fail(SessionEvent::DecodeFailed, failure);
            }
        }
        Delivery::Applied
    }

    fn install_image(&mut self, display: RgbaImage) {
        let image = ImageRef {
            source: self.source.clone(),
            native_width: display.width(),
            native_height: display.height(),
            display,
        };
        self.transform =
            DisplayTransform::fit(image.native_size(), self.viewport, self.config.viewport_budget);
        self.image = Some(image);
        let Some(limits) = self.limits() else {
            return;
        };

        let cap = self
            .config
            .initial_box_cap
            .map(|cap| cap * self.transform.scale());
        let crop_box = initial_crop_box(
            &limits,
            self.config.aspect_ratio,
            self.config.initial_box_fraction,
            cap,
        );
        self.set_box(crop_box);
        let entry = HistoryEntry::capture(crop_box, &self.transform);
        self.history.set_initial(entry);
        self.initial = Some(entry);

        if self.transition(SessionEvent::DecodeSucceeded) {
            tracing::info!(
                session = %self.id,
                width = self.image.as_ref().map_or(0, |image| image.native_width),
                height = self.image.as_ref().map_or(0, |image| image.native_height),
                scale = self.transform.scale(),
                "image loaded"
            );
        }
    }

    /// Decodes on the calling thread.
    pub fn load_blocking(&mut self, decoder: &dyn ImageDecoder) -> Delivery {
        let Some(ticket) = self.begin_load() else {
            return Delivery::Stale;
        };
        let result = decoder.decode(&self.source);
        self.complete_load(ticket, result)
    }

    /// Decodes on a worker thread; call [`poll`](Self::poll) to apply the result.
    pub fn start_decode(&mut self, decoder: Arc<dyn ImageDecoder>) -> bool {
        let Some(ticket) = self.begin_load() else {
            return false;
        };
        let source = self.source.clone();
        let handle = spawn_worker(move || decoder.decode(&source));
        self.pending = Some(PendingJob::Decode(ticket, handle));
        true
    }

    // Gestures

    fn set_box(&mut self, crop_box: CropBox) {
        self.crop_box = Some(crop_box);
        self.revision += 1;
        self.mask.rebuild(&crop_box, self.revision);
        self.throttle.mark_dirty();
    }

    /// Stores an already-constrained box: mask first, then the debounced snapshot.
    fn accept(&mut self, next: CropBox) -> GestureOutcome {
        let Some(current) = self.crop_box else {
            return GestureOutcome::Ignored;
        };
        if next.approx_eq(&current, NOOP_EPSILON) {
            return GestureOutcome::Unchanged;
        }
        self.set_box(next);
        let now = self.clock.now();
        self.pending_history
            .notify(now, HistoryEntry::capture(next, &self.transform));
        tracing::trace!(session = %self.id, revision = self.revision, ?next, "crop box updated");
        GestureOutcome::Applied
    }

    fn editable(&self) -> Option<(CropBox, CropLimits)> {
        if !self.state().accepts_gestures() {
            return None;
        }
        Some((self.crop_box?, self.limits()?))
    }

    pub fn move_by(&mut self, dx: f64, dy: f64) -> GestureOutcome {
        let Some((current, limits)) = self.editable() else {
            return GestureOutcome::Ignored;
        };
        self.accept(move_by(&current, dx, dy, &limits))
    }

    pub fn move_to(&mut self, left: f64, top: f64) -> GestureOutcome {
        let Some((current, limits)) = self.editable() else {
            return GestureOutcome::Ignored;
        };
        self.accept(move_to(&current, left, top, &limits))
    }

    /// Drags `handle` to `pointer` (display space).
    pub fn resize(&mut self, handle: ResizeHandle, pointer: Point) -> GestureOutcome {
        let Some((current, limits)) = self.editable() else {
            return GestureOutcome::Ignored;
        };
        self.accept(resize_from_handle(&current, handle, pointer, &limits))
    }

    /// Sets a free (`None`) or locked ratio, keeping the box center.
    pub fn set_aspect_ratio(&mut self, ratio: Option<f64>) -> GestureOutcome {
        let Some((current, limits)) = self.editable() else {
            return GestureOutcome::Ignored;
        };
        self.accept(apply_aspect_ratio(&current, ratio, &limits))
    }

    pub fn set_preset(&mut self, preset: CropPreset) -> GestureOutcome {
        let Some(image) = self.image.as_ref() else {
            return GestureOutcome::Ignored;
        };
        let ratio = preset.resolve_ratio(image.native_width, image.native_height);
        self.set_aspect_ratio(ratio)
    }

    /// Goes back to the box the session started with.
    pub fn reset(&mut self) -> GestureOutcome {
        let Some((_, limits)) = self.editable() else {
            return GestureOutcome::Ignored;
        };
        let Some(initial) = self.initial else {
            return GestureOutcome::Ignored;
        };
        let restored = initial.restore_under(&self.transform);
        self.accept(constrain(restored, &limits, ChangedDimension::Width))
    }

    /// What a pointer at `point` would grab.
    pub fn hit_test(&self, point: Point) -> Option<CropHit> {
        self.crop_box?.hit_test(point, self.config.style.handle_size)
    }

    /// Starts a pointer drag. Returns what was grabbed, or `None` when the
    /// pointer missed the box or the session is not `Ready`.
    pub fn begin_drag(&mut self, pointer: Point) -> Option<CropHit> {
        if self.state() != SessionState::Ready {
            return None;
        }
        let origin = self.crop_box?;
        let hit = origin.hit_test(pointer, self.config.style.handle_size)?;
        if !self.transition(SessionEvent::BeginDrag) {
            return None;
        }
        self.drag = Some(DragState {
            hit,
            start: pointer,
            origin,
        });
        tracing::debug!(session = %self.id, ?hit, "drag started");
        Some(hit)
    }

    pub fn drag_to(&mut self, pointer: Point) -> GestureOutcome {
        if self.state() != SessionState::Cropping {
            return GestureOutcome::Ignored;
        }
        let (Some(drag), Some(limits)) = (self.drag, self.limits()) else {
            return GestureOutcome::Ignored;
        };
        let next = match drag.hit {
            CropHit::Body => move_to(
                &drag.origin,
                drag.origin.left + (pointer.x - drag.start.x),
                drag.origin.top + (pointer.y - drag.start.y),
                &limits,
            ),
            CropHit::Handle(handle) => resize_from_handle(&drag.origin, handle, pointer, &limits),
        };
        self.accept(next)
    }

    pub fn end_drag(&mut self) -> GestureOutcome {
        if self.state() != SessionState::Cropping {
            return GestureOutcome::Ignored;
        }
        self.drag = None;
        if self.transition(SessionEvent::EndDrag) {
            GestureOutcome::Unchanged
        } else {
            GestureOutcome::Ignored
        }
    }

    // History

    fn flush_pending_history(&mut self) {
        if let Some(entry) = self.pending_history.flush() {
            self.history.save(entry);
        }
    }

    fn restore(&mut self, entry: HistoryEntry) -> GestureOutcome {
        let Some(limits) = self.limits() else {
            return GestureOutcome::Ignored;
        };
        let restored = constrain(
            entry.restore_under(&self.transform),
            &limits,
            ChangedDimension::Width,
        );
        self.set_box(restored);
        GestureOutcome::Applied
    }

    pub fn undo(&mut self) -> GestureOutcome {
        if self.editable().is_none() {
            return GestureOutcome::Ignored;
        }
        self.flush_pending_history();
        match self.history.undo() {
            Some(entry) => self.restore(entry),
            None => GestureOutcome::Unchanged,
        }
    }

    pub fn redo(&mut self) -> GestureOutcome {
        if self.editable().is_none() {
            return GestureOutcome::Ignored;
        }
        self.flush_pending_history();
        match self.history.redo() {
            Some(entry) => self.restore(entry),
            None => GestureOutcome::Unchanged,
        }
    }

    /// Saves the pending snapshot once the quiet period has passed. Returns true
    /// when one was saved.
    pub fn tick(&mut self) -> bool {
        if self.state().is_terminal() {
            return false;
        }
        match self.pending_history.poll(self.clock.now()) {
            Some(entry) => {
                self.history.save(entry);
                tracing::debug!(
                    session = %self.id,
                    entries = self.history.len(),
                    "history snapshot saved"
                );
                true
            }
            None => false,
        }
    }

    /// When [`tick`](Self::tick) next has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending_history.deadline()
    }

    // Rendering

    pub fn mask_is_current(&self) -> bool {
        self.mask.is_current(self.revision)
    }

    /// True at most once per frame interval while something changed since the last frame.
    pub fn frame_due(&mut self) -> bool {
        let now = self.clock.now();
        self.throttle.begin_frame(now)
    }

    pub fn paint_mask<S: MaskSurface + ?Sized>(&self, surface: &mut S) {
        self.mask.paint(surface);
    }

    /// Refits the image to a new viewport. The box keeps its native region.
    pub fn resize_viewport(&mut self, viewport: Size) {
        if self.state().is_terminal() || viewport == self.viewport {
            return;
        }
        self.viewport = viewport;
        self.mask.set_canvas(viewport);
        let Some(native) = self.image.as_ref().map(ImageRef::native_size) else {
            return;
        };
        let previous = self.transform;
        self.transform = DisplayTransform::fit(native, viewport, self.config.viewport_budget);
        if let Some(drag) = self.drag.as_mut() {
            drag.origin = drag
                .origin
                .with_rect(self.transform.remap_from(&previous, drag.origin.rect()));
            drag.start = self.transform.to_display(previous.to_native(drag.start));
        }
        let (Some(crop_box), Some(limits)) = (self.crop_box, self.limits()) else {
            return;
        };
        let remapped = crop_box.with_rect(self.transform.remap_from(&previous, crop_box.rect()));
        self.set_box(constrain(remapped, &limits, ChangedDimension::Width));
        tracing::debug!(session = %self.id, scale = self.transform.scale(), "viewport resized");
    }

    // Commit

    /// Moves to `Committing` and hands out what the extraction needs.
    ///
    /// A region that snaps to zero pixels is rejected here; the session goes
    /// back to `Ready` with its box intact.
    pub fn begin_commit(&mut self) -> Result<CommitRequest, SessionFailure> {
        if self.state() != SessionState::Ready {
            return Err(SessionFailure::new(
                FailureKind::Extract,
                format!("cannot commit while {:?}", self.state()),
            ));
        }
        self.flush_pending_history();
        let region = self.pixel_region().ok_or_else(|| {
            SessionFailure::new(FailureKind::Extract, "no crop box to commit")
        })?;
        if !self.transition(SessionEvent::Commit) {
            return Err(SessionFailure::new(FailureKind::Extract, "commit not accepted"));
        }
        self.generation += 1;
        self.failure = None;
        if region.is_empty() {
            let failure = SessionFailure::new(
                FailureKind::Extract,
                format!("crop region is empty ({}x{})", region.width, region.height),
            );
            self.fail(SessionEvent::CommitRejected, failure.clone());
            return Err(failure);
        }
        tracing::debug!(session = %self.id, ?region, "commit started");
        Ok(CommitRequest {
            ticket: CommitTicket {
                session: self.id,
                generation: self.generation,
            },
            region,
            source: self.source.clone(),
        })
    }

    fn commit_ticket_is_live(&self, ticket: CommitTicket) -> bool {
        ticket.session == self.id
            && ticket.generation == self.generation
            && self.state() == SessionState::Committing
    }

    /// Applies a finished extraction. Stale tickets are dropped.
    pub fn finish_commit(
        &mut self,
        ticket: CommitTicket,
        result: ExtractResult<CroppedImage>,
    ) -> Delivery {
        if !self.commit_ticket_is_live(ticket) {
            tracing::warn!(
                session = %self.id,
                state = ?self.state(),
                "dropping late commit result"
            );
            return Delivery::Stale;
        }
        match result {
            Ok(cropped) => {
                if self.transition(SessionEvent::CommitSucceeded) {
                    tracing::info!(
                        session = %self.id,
                        width = cropped.width(),
                        height = cropped.height(),
                        "crop committed"
                    );
                    let callback = self.on_crop_complete.take();
                    self.release();
                    if let Some(callback) = callback {
                        callback(cropped);
                    }
                }
            }
            Err(err) if err.is_fatal() => {
                let failure = SessionFailure::from_error(FailureKind::CommitDecode, &err);
                self.fail(SessionEvent::CommitFailed, failure);
            }
            Err(err) => {
                let failure = SessionFailure::from_error(FailureKind::Extract, &err);
                self.fail(SessionEvent::CommitRejected, failure);
            }
        }
        Delivery::Applied
    }

    /// Extracts on the calling thread.
    pub fn commit_blocking(&mut self, decoder: &dyn ImageDecoder) -> Result<(), SessionFailure> {
        let request = self.begin_commit()?;
        let result = extract(request.region, &request.source, decoder);
        self.finish_commit(request.ticket, result);
        match self.failure.as_ref() {
            Some(failure) if self.state() != SessionState::Closed => Err(failure.clone()),
            _ => Ok(()),
        }
    }

    /// Extracts on a worker thread; call [`poll`](Self::poll) to apply the result.
    pub fn start_commit(&mut self, decoder: Arc<dyn ImageDecoder>) -> Result<(), SessionFailure> {
        let request = self.begin_commit()?;
        let CommitRequest {
            ticket,
            region,
            source,
        } = request;
        let handle = spawn_worker(move || extract(region, &source, &*decoder));
        self.pending = Some(PendingJob::Commit(ticket, handle));
        Ok(())
    }

    // Background jobs

    /// Applies a finished background job, if any. Returns true when something was applied.
    pub fn poll(&mut self) -> bool {
        self.collect(|handle| handle.try_take(), |handle| handle.try_take())
    }

    /// Like [`poll`](Self::poll), but blocks up to `timeout` for the job to finish.
    pub fn wait(&mut self, timeout: Duration) -> bool {
        self.collect(|handle| handle.wait(timeout), |handle| handle.wait(timeout))
    }

    fn collect(
        &mut self,
        decode: impl FnOnce(
            &WorkerHandle<DecodeResult<RgbaImage>>,
        ) -> WorkerPoll<DecodeResult<RgbaImage>>,
        commit: impl FnOnce(
            &WorkerHandle<ExtractResult<CroppedImage>>,
        ) -> WorkerPoll<ExtractResult<CroppedImage>>,
    ) -> bool {
        let Some(job) = self.pending.take() else {
            return false;
        };
        match job {
            PendingJob::Decode(ticket, handle) => match decode(&handle) {
                WorkerPoll::Pending => {
                    self.pending = Some(PendingJob::Decode(ticket, handle));
                    false
                }
                WorkerPoll::Ready(result) => {
                    self.complete_load(ticket, result) == Delivery::Applied
                }
                WorkerPoll::Lost => {
                    if self.load_ticket_is_live(ticket) {
                        self.fail(SessionEvent::DecodeFailed, worker_lost());
                    }
                    true
                }
            },
            PendingJob::Commit(ticket, handle) => match commit(&handle) {
                WorkerPoll::Pending => {
                    self.pending = Some(PendingJob::Commit(ticket, handle));
                    false
                }
                WorkerPoll::Ready(result) => {
                    self.finish_commit(ticket, result) == Delivery::Applied
                }
                WorkerPoll::Lost => {
                    if self.commit_ticket_is_live(ticket) {
                        self.fail(SessionEvent::CommitFailed, worker_lost());
                    }
                    true
                }
            },
        }
    }

    // Teardown

    /// Abandons the session. Any in-flight job is detached and its result will be dropped.
    ///
    /// Returns false when the session had already finished.
    pub fn cancel(&mut self) -> bool {
        if self.state().is_terminal() {
            return false;
        }
        if !self.transition(SessionEvent::Cancel) {
            return false;
        }
        self.generation += 1;
        let callback = self.on_cancel.take();
        self.release();
        tracing::info!(session = %self.id, "crop session cancelled");
        if let Some(callback) = callback {
            callback();
        }
        true
    }

    /// Same as [`cancel`](Self::cancel).
    pub fn close(&mut self) -> bool {
        self.cancel()
    }

    fn release(&mut self) {
        self.pending = None;
        self.drag = None;
        self.pending_history.cancel();
        self.mask.clear();
        self.history.clear();
        self.on_crop_complete = None;
        self.on_cancel = None;
    }

    fn fail(&mut self, event: SessionEvent, failure: SessionFailure) {
        if !self.transition(event) {
            return;
        }
        tracing::warn!(
            session = %self.id,
            kind = ?failure.kind,
            reason = %failure.reason,
            "crop session failure"
        );
        if self.state().is_terminal() {
            self.release();
        }
        if let Some(callback) = self.on_failure.as_mut() {
            callback(&failure);
        }
        self.failure = Some(failure);
    }

    fn transition(&mut self, event: SessionEvent) -> bool {
        match self.machine.transition(event) {
            Ok(state) => {
                tracing::debug!(session = %self.id, ?event, ?state, "session transition");
                true
            }
            Err(err) => {
                tracing::warn!(session = %self.id, %err, "session transition refused");
                false
            }
        }
    }
}

fn worker_lost() -> SessionFailure {
    SessionFailure::new(FailureKind::WorkerLost, "worker exited without a result")
}
