//! Per-block mixing pass.
//!
//! [`Mixer`] holds everything the audio callback touches. It lives behind the
//! context's single lock; every method here runs with that lock held.

use crate::config::ContextDesc;
use crate::distance::DistanceModel;
use crate::error::{Result, SonanceError};
use crate::format::{self, AudioSpec, MAX_MIX_VOLUME, mix, mix_volume};
use crate::math::{ListenerFrame, Vec3};
use crate::object::{Object, ObjectId};
use crate::spatial::Spatializer;
use crate::stream::Stream;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::Arc;

/// Playback state of one numbered stream.
pub(crate) struct StreamState {
    pub stream: Box<dyn Stream>,
    pub looping: bool,
    pub gain: f32,
    pub paused: bool,
    raw: Vec<u8>,
    pending: Vec<i16>,
}

impl StreamState {
    pub fn new(stream: Box<dyn Stream>, looping: bool) -> Self {
        Self {
            stream,
            looping,
            gain: 1.0,
            paused: false,
            raw: Vec::new(),
            pending: Vec::new(),
        }
    }
}

/// A source admitted for rendering this block.
#[derive(Debug, Clone, Copy)]
struct RenderEntry {
    object: usize,
    source: usize,
    /// Source minus listener, world frame.
    offset: Vec3,
    /// Same offset in the listener frame.
    local: Vec3,
    velocity: Vec3,
}

pub(crate) struct Mixer {
    pub spec: AudioSpec,
    pub spatializer: Arc<Spatializer>,
    pub objects: Vec<Object>,
    pub listener: ObjectId,
    next_object_id: u64,
    pub streams: BTreeMap<i32, StreamState>,
    pub max_sources: usize,
    pub fx_volume: f32,
    pub distance_model: DistanceModel,
    dump: Option<BufWriter<File>>,
    scratch: Vec<i16>,
    render_set: Vec<RenderEntry>,
    culled: Vec<(usize, usize)>,
    finished_streams: Vec<i32>,
    dump_bytes: Vec<u8>,
}

impl Mixer {
    pub fn new(desc: &ContextDesc, spatializer: Arc<Spatializer>) -> Self {
        let spec = AudioSpec::s16(desc.sample_rate, desc.channels);
        let block = desc.block_size * desc.channels as usize;
        let mut mixer = Self {
            spec,
            spatializer,
            objects: Vec::new(),
            listener: ObjectId(0),
            next_object_id: 0,
            streams: BTreeMap::new(),
            max_sources: desc.max_sources,
            fx_volume: desc.fx_volume,
            distance_model: desc.distance_model,
            dump: None,
            scratch: Vec::with_capacity(block),
            render_set: Vec::with_capacity(desc.max_sources),
            culled: Vec::new(),
            finished_streams: Vec::new(),
            dump_bytes: Vec::with_capacity(block * 2),
        };
        mixer.listener = mixer.create_object();
        mixer
    }

    pub fn create_object(&mut self) -> ObjectId {
        let id = ObjectId(self.next_object_id);
        self.next_object_id += 1;
        self.objects.push(Object::new(id));
        id
    }

    pub fn object(&self, id: ObjectId) -> Option<&Object> {
        self.objects.iter().find(|o| o.id == id)
    }

    pub fn object_mut(&mut self, id: ObjectId) -> Result<&mut Object> {
        self.objects
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or_else(|| SonanceError::Engine(format!("{id} does not exist")))
    }

    pub fn remove_object(&mut self, id: ObjectId) -> Result<()> {
        if id == self.listener {
            return Err(SonanceError::InvalidArgument(
                "the listener cannot be destroyed".into(),
            ));
        }
        let before = self.objects.len();
        self.objects.retain(|o| o.id != id);
        if self.objects.len() == before {
            return Err(SonanceError::Engine(format!("{id} does not exist")));
        }
        Ok(())
    }

    /// Starts or stops the raw dump; an empty path stops it.
    pub fn save(&mut self, path: &std::path::Path) -> Result<()> {
        if let Some(mut writer) = self.dump.take() {
            if let Err(e) = writer.flush() {
                log::warn!("Failed to flush diagnostic dump: {e}");
            }
        }
        if path.as_os_str().is_empty() {
            return Ok(());
        }
        self.dump = Some(BufWriter::new(File::create(path)?));
        log::info!("Dumping mixed output to {}", path.display());
        Ok(())
    }

    pub fn is_dumping(&self) -> bool {
        self.dump.is_some()
    }

    /// Produces one interleaved block.
    pub fn process(&mut self, out: &mut [i16]) -> Result<()> {
        let channels = self.spec.channels as usize;
        if out.len() % channels != 0 {
            return Err(SonanceError::InvalidArgument(format!(
                "block of {} samples is not a whole number of {channels}-channel frames",
                out.len()
            )));
        }
        let frames = out.len() / channels;

        let (listener_position, listener_velocity, listener_direction) = self
            .object(self.listener)
            .map(|l| (l.position, l.velocity, l.direction))
            .unwrap_or((Vec3::ZERO, Vec3::ZERO, Vec3::ZERO));
        let frame = ListenerFrame::from_direction(listener_direction);

        self.objects.sort_by(|a, b| {
            a.quick_distance(listener_position)
                .total_cmp(&b.quick_distance(listener_position))
        });
        self.reap();
        self.select_sources(listener_position, frame);

        for &(object, source) in &self.culled {
            self.objects[object].sources[source].1.skip(frames);
        }

        out.fill(0);
        self.mix_streams(out)?;

        let model = self.distance_model;
        for index in 0..self.render_set.len() {
            let entry = self.render_set[index];
            let pitch = if model.doppler_factor > 0.0 {
                model.doppler_pitch(-entry.offset, entry.velocity, listener_velocity)
            } else {
                1.0
            };
            let gain = self.fx_volume * model.gain(entry.offset.length());
            let source = &mut self.objects[entry.object].sources[entry.source].1;
            if mix_volume(gain) <= 0 {
                source.skip(frames);
                continue;
            }

            self.scratch.clear();
            self.scratch.resize(out.len(), 0);
            let volume =
                match source.process(&mut self.scratch, channels, entry.local, gain, pitch) {
                    Ok(volume) => volume,
                    Err(e) => {
                        log::warn!("Skipping source '{}': {e}", source.sample().name());
                        source.skip(frames);
                        continue;
                    }
                };
            let weight = mix_volume(volume).min(MAX_MIX_VOLUME);
            if weight > 0 {
                mix(out, &self.scratch, weight);
            }
        }

        self.write_dump(out);
        Ok(())
    }

    #[cfg(test)]
    pub fn rendered(&self) -> usize {
        self.render_set.len()
    }

    fn reap(&mut self) {
        let listener = self.listener;
        self.objects.retain_mut(|object| {
            object.sources.retain(|(_, source)| source.playing());
            let keep = object.id == listener || !(object.dead && object.sources.is_empty());
            if !keep {
                log::debug!("Reaped {}", object.id);
            }
            keep
        });
    }

    /// Fills the render set nearest first, up to `max_sources` and the
    /// same-name limit; everything else is culled.
    fn select_sources(&mut self, listener_position: Vec3, frame: ListenerFrame) {
        self.render_set.clear();
        self.culled.clear();
        let limit = self.distance_model.same_sounds_limit;

        for (oi, object) in self.objects.iter().enumerate() {
            for (si, (name, source)) in object.sources.iter().enumerate() {
                let admitted = self.render_set.len() < self.max_sources
                    && self
                        .render_set
                        .iter()
                        .filter(|e| self.objects[e.object].sources[e.source].0 == *name)
                        .count()
                        < limit;
                if admitted {
                    let offset = object.position + source.delta_position() - listener_position;
                    self.render_set.push(RenderEntry {
                        object: oi,
                        source: si,
                        offset,
                        local: frame.to_local(offset),
                        velocity: object.velocity,
                    });
                } else {
                    self.culled.push((oi, si));
                }
            }
        }
    }

    fn mix_streams(&mut self, out: &mut [i16]) -> Result<()> {
        let spec = self.spec;
        let needed = out.len();
        self.finished_streams.clear();

        for (&id, state) in self.streams.iter_mut() {
            if state.paused {
                continue;
            }
            let src_spec = state.stream.spec();
            let mut finished = false;
            let mut rewinds = 0;
            while state.pending.len() < needed {
                let missing = (needed - state.pending.len()) / spec.channels as usize;
                let hint = (missing as u64 * src_spec.sample_rate as u64
                    / spec.sample_rate as u64) as usize
                    * src_spec.frame_bytes()
                    + src_spec.frame_bytes();

                state.raw.clear();
                let more = match state.stream.read(&mut state.raw, hint) {
                    Ok(more) => more,
                    Err(e) => {
                        log::warn!("Stream {id} failed, dropping it: {e}");
                        finished = true;
                        break;
                    }
                };
                if !state.raw.is_empty() {
                    format::convert(&spec, &src_spec, &state.raw, &mut state.pending)?;
                    rewinds = 0;
                }
                if more {
                    if state.raw.is_empty() {
                        // underrun, mix what we have
                        break;
                    }
                    continue;
                }
                // an empty looping stream would rewind forever
                if state.looping && rewinds < 2 {
                    rewinds += 1;
                    if let Err(e) = state.stream.rewind() {
                        log::warn!("Stream {id} cannot loop: {e}");
                        finished = true;
                        break;
                    }
                } else {
                    finished = true;
                    break;
                }
            }

            if state.pending.is_empty() {
                if finished {
                    self.finished_streams.push(id);
                }
                continue;
            }
            let n = state.pending.len().min(needed);
            mix(&mut out[..n], &state.pending[..n], mix_volume(state.gain));
            state.pending.drain(..n);
        }

        for id in self.finished_streams.drain(..) {
            log::debug!("Stream {id} finished");
            self.streams.remove(&id);
        }
        Ok(())
    }

    fn write_dump(&mut self, out: &[i16]) {
        let Some(writer) = self.dump.as_mut() else {
            return;
        };
        self.dump_bytes.clear();
        format::encode_s16(out, &mut self.dump_bytes);
        if let Err(e) = writer.write_all(&self.dump_bytes) {
            log::warn!("Diagnostic dump disabled after write failure: {e}");
            self.dump = None;
        }
    }
}
