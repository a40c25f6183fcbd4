//! Public mixing context and object handles.
//!
//! All state lives in one [`Mixer`] behind one mutex. The audio callback and
//! every mutating call take that lock for the duration of the call only.

use crate::audio_data::{LoadOptions, load_audio_file};
use crate::config::ContextDesc;
use crate::distance::DistanceModel;
use crate::error::Result;
use crate::format::AudioSpec;
use crate::math::Vec3;
use crate::mixer::{Mixer, StreamState};
use crate::object::{DEFAULT_FADEOUT, Object, ObjectId};
use crate::sample::Sample;
use crate::source::Source;
use crate::spatial::{HrtfDataset, Spatializer, SphericalHeadDataset};
use crate::stream::Stream;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

fn lock(inner: &Mutex<Mixer>) -> MutexGuard<'_, Mixer> {
    // a panic elsewhere must not silence the audio thread
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The mixing engine: objects, the listener, background streams and the
/// distance model, rendered one block at a time by [`Context::process`].
///
/// `Context` is a cheap handle; clones share the same engine.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Mutex<Mixer>>,
    spec: AudioSpec,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context").field("spec", &self.spec).finish()
    }
}

impl Context {
    /// Creates a context using the built-in spherical-head HRTF dataset.
    ///
    /// # Errors
    ///
    /// Returns an error if the description fails validation.
    pub fn new(desc: ContextDesc) -> Result<Self> {
        Self::with_dataset(desc, Arc::new(SphericalHeadDataset::default()))
    }

    pub fn with_dataset(desc: ContextDesc, dataset: Arc<dyn HrtfDataset>) -> Result<Self> {
        desc.validate()?;
        let spatializer = Arc::new(Spatializer::new(
            dataset,
            desc.hrtf_window_bits,
            desc.window,
        )?);
        let mixer = Mixer::new(&desc, spatializer);
        let spec = mixer.spec;
        log::info!(
            "Context ready: {} Hz, {} channels, {} frame blocks, {} sources max",
            spec.sample_rate,
            spec.channels,
            desc.block_size,
            desc.max_sources
        );
        Ok(Self {
            inner: Arc::new(Mutex::new(mixer)),
            spec,
        })
    }

    /// Output format: S16, native endian.
    pub fn spec(&self) -> AudioSpec {
        self.spec
    }

    /// Renders one interleaved block. Failures are logged and leave whatever
    /// was already mixed in `out`; this never panics or returns an error, so
    /// it is safe to call from the device callback.
    pub fn process(&self, out: &mut [i16]) {
        let mut mixer = lock(&self.inner);
        if let Err(e) = mixer.process(out) {
            log::error!("Mixing pass failed: {e}");
        }
    }

    pub fn create_object(&self) -> ObjectHandle {
        let id = lock(&self.inner).create_object();
        self.handle(id)
    }

    pub fn listener(&self) -> ObjectHandle {
        let id = lock(&self.inner).listener;
        self.handle(id)
    }

    /// Number of live objects, the listener included.
    pub fn object_count(&self) -> usize {
        lock(&self.inner).objects.len()
    }

    /// An empty sample bound to this context's output rate.
    pub fn create_sample(&self) -> Sample {
        let mixer = lock(&self.inner);
        Sample::new(mixer.spec, Arc::clone(&mixer.spatializer))
    }

    /// Decodes an audio file into a new sample named after the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or decoded.
    pub fn load_sample(&self, path: impl AsRef<Path>) -> Result<Sample> {
        let path = path.as_ref();
        let audio = load_audio_file(path, &LoadOptions::default())?;
        let sample = self.create_sample();
        sample.init_decoded(&audio)?;
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            sample.set_name(stem);
        }
        log::debug!("Loaded sample '{}': {:?}", sample.name(), sample.length());
        Ok(sample)
    }

    /// Starts stream `id`, replacing whatever played under that id.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream reports a degenerate spec.
    pub fn play(&self, id: i32, stream: Box<dyn Stream>, looping: bool) -> Result<()> {
        stream.spec().validate()?;
        lock(&self.inner)
            .streams
            .insert(id, StreamState::new(stream, looping));
        Ok(())
    }

    pub fn playing(&self, id: i32) -> bool {
        lock(&self.inner).streams.contains_key(&id)
    }

    /// Toggles pause on stream `id`; returns the new paused state, or `None`
    /// if no such stream plays.
    pub fn pause(&self, id: i32) -> Option<bool> {
        let mut mixer = lock(&self.inner);
        let state = mixer.streams.get_mut(&id)?;
        state.paused = !state.paused;
        Some(state.paused)
    }

    pub fn stop(&self, id: i32) {
        lock(&self.inner).streams.remove(&id);
    }

    /// Sets the gain of stream `id`, clamped to [0, 1].
    pub fn set_volume(&self, id: i32, volume: f32) {
        if let Some(state) = lock(&self.inner).streams.get_mut(&id) {
            state.gain = volume.clamp(0.0, 1.0);
        }
    }

    /// Stops every stream.
    pub fn stop_all(&self) {
        lock(&self.inner).streams.clear();
    }

    pub fn fx_volume(&self) -> f32 {
        lock(&self.inner).fx_volume
    }

    /// Global gain applied to all positioned sources, clamped to [0, 1].
    pub fn set_fx_volume(&self, volume: f32) {
        lock(&self.inner).fx_volume = volume.clamp(0.0, 1.0);
    }

    pub fn max_sources(&self) -> usize {
        lock(&self.inner).max_sources
    }

    pub fn set_max_sources(&self, max: usize) {
        lock(&self.inner).max_sources = max;
    }

    pub fn distance_model(&self) -> DistanceModel {
        lock(&self.inner).distance_model
    }

    pub fn set_distance_model(&self, model: DistanceModel) {
        lock(&self.inner).distance_model = model;
    }

    /// Appends every mixed block to `path` as raw PCM in the output format.
    /// An empty path stops dumping.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        lock(&self.inner).save(path.as_ref())
    }

    pub fn is_dumping(&self) -> bool {
        lock(&self.inner).is_dumping()
    }

    fn handle(&self, id: ObjectId) -> ObjectHandle {
        ObjectHandle {
            id,
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Handle to an object living inside a [`Context`].
///
/// Operations on an object that has been destroyed or reaped fail with
/// [`crate::SonanceError::Engine`]; queries on it report nothing playing.
#[derive(Clone)]
pub struct ObjectHandle {
    id: ObjectId,
    inner: Arc<Mutex<Mixer>>,
}

impl std::fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectHandle").field("id", &self.id).finish()
    }
}

impl ObjectHandle {
    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn exists(&self) -> bool {
        lock(&self.inner).object(self.id).is_some()
    }

    fn with_object<R>(&self, f: impl FnOnce(&mut Object) -> R) -> Result<R> {
        let mut mixer = lock(&self.inner);
        Ok(f(mixer.object_mut(self.id)?))
    }

    fn query<R: Default>(&self, f: impl FnOnce(&Object) -> R) -> R {
        lock(&self.inner).object(self.id).map(f).unwrap_or_default()
    }

    /// Sets position, velocity and facing in one locked step.
    pub fn update(&self, position: Vec3, velocity: Vec3, direction: Vec3) -> Result<()> {
        self.with_object(|o| {
            o.position = position;
            o.velocity = velocity;
            o.direction = direction;
        })
    }

    pub fn set_position(&self, position: Vec3) -> Result<()> {
        self.with_object(|o| o.position = position)
    }

    pub fn set_velocity(&self, velocity: Vec3) -> Result<()> {
        self.with_object(|o| o.velocity = velocity)
    }

    /// Facing direction; only the listener's is used for rendering.
    pub fn set_direction(&self, direction: Vec3) -> Result<()> {
        self.with_object(|o| o.direction = direction)
    }

    pub fn position(&self) -> Vec3 {
        self.query(|o| o.position)
    }

    pub fn velocity(&self) -> Vec3 {
        self.query(|o| o.velocity)
    }

    pub fn direction(&self) -> Vec3 {
        self.query(|o| o.direction)
    }

    /// Hands `source` to the object under `name`. Names need not be unique.
    pub fn play(&self, name: impl Into<String>, source: Source) -> Result<()> {
        let name = name.into();
        self.with_object(|o| o.play(name, source))
    }

    pub fn playing(&self, name: &str) -> bool {
        self.query(|o| o.playing(name))
    }

    /// Removes the named sources now (`fadeout == 0`) or fades them out over
    /// `fadeout` seconds.
    pub fn cancel(&self, name: &str, fadeout: f32) -> Result<()> {
        self.with_object(|o| o.cancel(name, fadeout))
    }

    /// Cancels every source, immediately when `force` is set.
    pub fn cancel_all(&self, force: bool, fadeout: f32) -> Result<()> {
        self.with_object(|o| o.cancel_all(force, fadeout))
    }

    pub fn fade_out(&self, name: &str, fadeout: f32) -> Result<()> {
        self.with_object(|o| o.fade_out(name, fadeout))
    }

    /// Whether the object still owns any source.
    pub fn active(&self) -> bool {
        self.query(|o| o.active())
    }

    pub fn set_loop(&self, name: &str, looping: bool) -> Result<()> {
        self.with_object(|o| o.set_loop(name, looping))
    }

    pub fn get_loop(&self, name: &str) -> bool {
        self.query(|o| o.get_loop(name))
    }

    /// Fades every source and lets the mixer drop the object once silent.
    pub fn autodelete(self) -> Result<()> {
        self.with_object(|o| {
            o.cancel_all(false, DEFAULT_FADEOUT);
            o.dead = true;
        })
    }

    /// Removes the object and its sources now.
    ///
    /// # Errors
    ///
    /// Fails for the listener and for objects already gone.
    pub fn destroy(self) -> Result<()> {
        lock(&self.inner).remove_object(self.id)
    }
}
