use crate::errors::KinError;
use bytes::{Buf, BufMut};
use std::collections::btree_map::Iter;
use std::collections::BTreeMap;
use std::fmt;

/// A map of named scalar states tagged with a time and an availability time.
///
/// Radar measurements, measurement standard deviations and the outputs of the
/// measurement aggregation strategies are all state maps.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateMap {
    availability_time: f64,
    time: f64,
    states: BTreeMap<String, f64>,
}

impl StateMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Initializes a state map tagged at the given time; the availability
    /// time defaults to the time tag.
    pub fn at_time(time: f64) -> Self {
        Self {
            availability_time: time,
            time,
            states: BTreeMap::new(),
        }
    }

    pub fn with_availability(time: f64, availability_time: f64) -> Self {
        Self {
            availability_time,
            time,
            states: BTreeMap::new(),
        }
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn set_time(&mut self, time: f64) {
        self.time = time;
    }

    pub fn availability_time(&self) -> f64 {
        self.availability_time
    }

    pub fn set_availability_time(&mut self, availability_time: f64) {
        self.availability_time = availability_time;
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.states.get(name).copied()
    }

    /// Retrieves the named state, or zero when absent.
    pub fn get_or_zero(&self, name: &str) -> f64 {
        self.get(name).unwrap_or(0.0)
    }

    pub fn set(&mut self, name: &str, value: f64) {
        self.states.insert(name.to_string(), value);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.states.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<f64> {
        self.states.remove(name)
    }

    pub fn iter(&self) -> Iter<String, f64> {
        self.states.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.states.keys()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn clear(&mut self) {
        self.states.clear();
    }

    /// Serializes as `f64 availability_time, f64 time, u64 entry_count`, then
    /// for each entry the NUL-terminated name followed by the `f64` value.
    pub fn serialize<B: BufMut>(&self, buf: &mut B) {
        buf.put_f64_le(self.availability_time);
        buf.put_f64_le(self.time);
        buf.put_u64_le(self.states.len() as u64);
        for (name, value) in &self.states {
            buf.put_slice(name.as_bytes());
            buf.put_u8(0);
            buf.put_f64_le(*value);
        }
    }

    /// Deserializes a state map written by [StateMap::serialize].
    pub fn deserialize<B: Buf>(buf: &mut B) -> Result<Self, KinError> {
        if buf.remaining() < 24 {
            return Err(KinError::LoadingError("truncated state map header".to_string()));
        }
        let availability_time = buf.get_f64_le();
        let time = buf.get_f64_le();
        let count = buf.get_u64_le();
        let mut states = BTreeMap::new();
        for _ in 0..count {
            let mut name = Vec::new();
            loop {
                if !buf.has_remaining() {
                    return Err(KinError::LoadingError(
                        "truncated state map entry name".to_string(),
                    ));
                }
                match buf.get_u8() {
                    0 => break,
                    byte => name.push(byte),
                }
            }
            let name = String::from_utf8(name)
                .map_err(|_| KinError::LoadingError("state name is not UTF-8".to_string()))?;
            if buf.remaining() < 8 {
                return Err(KinError::LoadingError(
                    "truncated state map entry value".to_string(),
                ));
            }
            states.insert(name, buf.get_f64_le());
        }
        Ok(Self {
            availability_time,
            time,
            states,
        })
    }
}

impl fmt::Display for StateMap {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "t = {} (avail {}):", self.time, self.availability_time)?;
        for (name, value) in &self.states {
            write!(f, " {} = {}", name, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_round_trip() {
        let mut map = StateMap::with_availability(12.5, 13.0);
        map.set("azimuth", 0.25);
        map.set("range", 1000.0);
        map.set("rangeRate", -35.5);
        map.set("zenith", 1.5);
        let mut buf = bytes::BytesMut::new();
        map.serialize(&mut buf);
        let back = StateMap::deserialize(&mut buf.freeze()).unwrap();
        assert_eq!(map, back);
    }

    #[test]
    fn missing_names_read_as_zero() {
        let map = StateMap::at_time(0.0);
        assert_eq!(map.get("azimuth"), None);
        assert_eq!(map.get_or_zero("azimuth"), 0.0);
    }
}
