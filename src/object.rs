//! Positioned emitters owning named sources.

use crate::math::Vec3;
use crate::source::Source;
use std::fmt;

/// Unique identifier for an object within a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub(crate) u64);

impl ObjectId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.0)
    }
}

/// Fade used when an object is cancelled without an explicit fade length.
pub const DEFAULT_FADEOUT: f32 = 0.1;

/// An emitter with a name -> source multimap. Several sources may share a
/// name; operations by name apply to all of them in insertion order.
#[derive(Debug)]
pub(crate) struct Object {
    pub id: ObjectId,
    pub position: Vec3,
    pub velocity: Vec3,
    pub direction: Vec3,
    pub sources: Vec<(String, Source)>,
    /// Reap once the last source finishes.
    pub dead: bool,
}

impl Object {
    pub fn new(id: ObjectId) -> Self {
        Self {
            id,
            position: Vec3::ZERO,
            velocity: Vec3::ZERO,
            direction: Vec3::ZERO,
            sources: Vec::new(),
            dead: false,
        }
    }

    pub fn play(&mut self, name: String, source: Source) {
        self.sources.push((name, source));
    }

    pub fn playing(&self, name: &str) -> bool {
        self.named(name).any(|s| s.playing())
    }

    /// Deletes the named sources now when `fadeout` is zero, otherwise fades
    /// them out.
    pub fn cancel(&mut self, name: &str, fadeout: f32) {
        if fadeout <= 0.0 {
            self.sources.retain(|(n, _)| n != name);
        } else {
            self.fade_out(name, fadeout);
        }
    }

    pub fn cancel_all(&mut self, force: bool, fadeout: f32) {
        if force || fadeout <= 0.0 {
            self.sources.clear();
            return;
        }
        for (_, source) in &mut self.sources {
            source.fade_out(fadeout);
        }
    }

    pub fn fade_out(&mut self, name: &str, fadeout: f32) {
        for source in self.named_mut(name) {
            source.fade_out(fadeout);
        }
    }

    pub fn active(&self) -> bool {
        !self.sources.is_empty()
    }

    /// Loops the first named source and un-loops the rest.
    pub fn set_loop(&mut self, name: &str, looping: bool) {
        let mut first = true;
        for source in self.named_mut(name) {
            source.set_loop(looping && first);
            first = false;
        }
    }

    pub fn get_loop(&self, name: &str) -> bool {
        self.named(name).any(|s| s.is_looping())
    }

    /// Squared distance, enough for ordering.
    pub fn quick_distance(&self, to: Vec3) -> f32 {
        self.position.distance_squared(to)
    }

    fn named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Source> + 'a {
        self.sources
            .iter()
            .filter(move |(n, _)| n == name)
            .map(|(_, s)| s)
    }

    fn named_mut<'a>(&'a mut self, name: &'a str) -> impl Iterator<Item = &'a mut Source> + 'a {
        self.sources
            .iter_mut()
            .filter(move |(n, _)| n == name)
            .map(|(_, s)| s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::test_sample;

    fn object_with(names: &[&str]) -> Object {
        let sample = test_sample(1000, vec![1; 100], 1);
        let mut object = Object::new(ObjectId(1));
        for name in names {
            object.play(name.to_string(), Source::new(&sample).unwrap());
        }
        object
    }

    #[test]
    fn test_play_and_query() {
        let object = object_with(&["step", "step", "voice"]);
        assert!(object.active());
        assert!(object.playing("step"));
        assert!(!object.playing("engine"));
    }

    #[test]
    fn test_cancel_without_fade_deletes() {
        let mut object = object_with(&["step", "step", "voice"]);
        object.cancel("step", 0.0);
        assert_eq!(object.sources.len(), 1);
        assert!(!object.playing("step"));
    }

    #[test]
    fn test_cancel_with_fade_keeps_until_faded() {
        let mut object = object_with(&["step", "voice"]);
        object.cancel("step", DEFAULT_FADEOUT);
        assert_eq!(object.sources.len(), 2);
        assert!(object.playing("step"));
        for (_, source) in &mut object.sources {
            source.skip(100);
        }
        assert!(!object.playing("step"));
    }

    #[test]
    fn test_cancel_all() {
        let mut object = object_with(&["a", "b"]);
        object.cancel_all(false, 0.05);
        assert_eq!(object.sources.len(), 2);
        object.cancel_all(true, 0.05);
        assert!(!object.active());
    }

    #[test]
    fn test_set_loop_only_first() {
        let mut object = object_with(&["hum", "hum", "other"]);
        object.set_loop("hum", true);
        let loops: Vec<bool> = object.sources.iter().map(|(_, s)| s.is_looping()).collect();
        assert_eq!(loops, vec![true, false, false]);
        assert!(object.get_loop("hum"));
        assert!(!object.get_loop("other"));
        object.set_loop("hum", false);
        assert!(!object.get_loop("hum"));
    }

    #[test]
    fn test_quick_distance() {
        let mut object = Object::new(ObjectId(3));
        object.position = Vec3::new(3.0, 4.0, 0.0);
        assert_eq!(object.quick_distance(Vec3::ZERO), 25.0);
        assert_eq!(ObjectId(3).to_string(), "ObjectId(3)");
    }
}
