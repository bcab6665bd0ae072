extern crate kintrack;

use kintrack::containers::TimeSortedContainer;
use kintrack::estimation::applied::RadarMeasurement;

fn measurement(track: &str, t: f64, range: f64) -> Box<RadarMeasurement> {
    let mut m = RadarMeasurement::new(track, t);
    m.set_range(range);
    Box::new(m)
}

#[test]
fn capacity_bound_holds_per_track() {
    let mut container = TimeSortedContainer::with_max_size(5);
    // interleave two tracks with shuffled times
    for &t in &[7.0, 1.0, 9.0, 3.0, 5.0, 2.0, 8.0, 4.0, 6.0, 0.0] {
        container.add(measurement("alpha", t, 10.0 * t));
        container.add(measurement("bravo", -t, -t));
    }

    for id in container.ids() {
        assert!(container.len_of(&id) <= 5);
        // strictly increasing times within each track
        let entries = container.get_all(&id);
        for pair in entries.windows(2) {
            assert!(pair[0].time() < pair[1].time());
        }
    }
    // the newest entries survived eviction
    assert_eq!(container.latest(&"alpha".to_string()).unwrap().time(), 9.0);
}

#[test]
fn range_query_matches_full_scan() {
    let mut container = TimeSortedContainer::new();
    for t in 0..20 {
        container.add(measurement("trk", t as f64 * 0.5, t as f64));
    }
    let id = "trk".to_string();
    let (t0, t1) = (2.25, 7.75);

    let ranged = container.get(&id, t0, t1);
    let scanned: Vec<&RadarMeasurement> = container
        .get_all(&id)
        .into_iter()
        .filter(|entry| entry.time() >= t0 && entry.time() <= t1)
        .collect();

    assert_eq!(ranged.len(), scanned.len());
    for (a, b) in ranged.iter().zip(scanned.iter()) {
        assert!(std::ptr::eq(*a, *b));
    }
}

#[test]
fn equal_time_replaces_instead_of_duplicating() {
    let mut container = TimeSortedContainer::new();
    container.add(measurement("trk", 4.0, 100.0));
    container.add(measurement("trk", 4.0, 250.0));

    let id = "trk".to_string();
    assert_eq!(container.len_of(&id), 1);
    assert_eq!(container.get_at(&id, 4.0).unwrap().range(), 250.0);
}

#[test]
fn most_recent_available_respects_bound() {
    let mut container = TimeSortedContainer::new();
    for &t in &[1.0, 3.0, 5.0] {
        container.add(measurement("trk", t, t));
    }
    let id = "trk".to_string();
    assert_eq!(container.most_recent_available(&id, 4.0).unwrap().time(), 3.0);
    assert_eq!(container.most_recent_available(&id, 5.0).unwrap().time(), 5.0);
    assert!(container.most_recent_available(&id, 0.5).is_none());
}

#[test]
fn deletion_and_removal_semantics() {
    let mut container = TimeSortedContainer::new();
    for &t in &[1.0, 2.0, 3.0, 4.0] {
        container.add(measurement("trk", t, t));
    }
    let id = "trk".to_string();

    assert_eq!(container.delete(&id, 1.5, 3.5), 2);
    assert_eq!(container.len(), 2);

    // removal releases ownership instead of dropping
    let target = container.latest(&id).unwrap() as *const RadarMeasurement;
    let released = {
        let entry = unsafe { &*target };
        container.take_entry(entry).unwrap()
    };
    assert_eq!(released.time(), 4.0);
    assert_eq!(container.len(), 1);

    container.delete_id(&id);
    assert!(container.is_empty());
}

#[test]
fn iteration_yields_id_time_entry_triples() {
    let mut container = TimeSortedContainer::new();
    container.add(measurement("alpha", 2.0, 1.0));
    container.add(measurement("alpha", 1.0, 2.0));
    container.add(measurement("bravo", 0.5, 3.0));

    let triples: Vec<(String, f64)> = container
        .iter()
        .map(|(id, time, _)| (id.clone(), time))
        .collect();
    assert_eq!(
        triples,
        vec![
            ("alpha".to_string(), 1.0),
            ("alpha".to_string(), 2.0),
            ("bravo".to_string(), 0.5),
        ]
    );
}

#[test]
fn shared_use_behind_a_mutex() {
    use std::sync::{Arc, Mutex};
    use std::thread;

    let container = Arc::new(Mutex::new(TimeSortedContainer::with_max_size(64)));
    let mut handles = Vec::new();
    for worker in 0..4 {
        let container = Arc::clone(&container);
        handles.push(thread::spawn(move || {
            for i in 0..16 {
                let t = (worker * 16 + i) as f64;
                container.lock().unwrap().add(measurement("shared", t, t));
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(container.lock().unwrap().len(), 64);
}
