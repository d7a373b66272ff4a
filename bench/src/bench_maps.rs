use std::hash::Hash;

use cachemaps::{ConcurrentBoundedMap, LruHashMap, SplayMap};
use dashmap::DashMap;
use rand::{distributions::Alphanumeric, Rng};
use std::sync::Arc;
use std::sync::Barrier;
use std::thread;
use std::time::Instant;

const NUM_ENTRIES: usize = 1_000_000;
const NUM_THREADS: usize = 10;

macro_rules! bench {
    ($name: expr, $body: expr) => {
        let now = Instant::now();
        $body;
        let elapsed = now.elapsed();
        println!("{} elapsed: {:.2?}", $name, elapsed);
    };
}

fn make_random_string() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(7)
        .map(char::from)
        .collect()
}

fn make_random_string_pairs(n: usize) -> Vec<(String, String)> {
    (0..n)
        .map(|_| (make_random_string(), make_random_string()))
        .collect()
}

/// Splits `data` into exactly `num_partitions` parts, the last one possibly
/// shorter.
fn partition_data<T: Clone>(data: &[T], num_partitions: usize) -> Vec<Vec<T>> {
    let partition_sz = data.len().div_ceil(num_partitions).max(1);
    let mut out: Vec<Vec<T>> = data
        .chunks(partition_sz)
        .map(|chunk| chunk.to_vec())
        .collect();
    out.resize_with(num_partitions, Vec::new);
    out
}

fn bench_single_threaded<K: Hash + Eq + Ord + Clone, V: Clone>(src: &[(K, V)]) {
    println!("bench single threaded");

    let map_data = src.to_vec();
    bench!("ConcurrentBoundedMap", {
        let map = ConcurrentBoundedMap::new(src.len());
        for (key, val) in map_data {
            map.put(key, val);
        }
    });

    let dmap_data = src.to_vec();
    bench!("DashMap", {
        let map = DashMap::new();
        for (key, val) in dmap_data {
            map.insert(key, val);
        }
    });

    let lru_data = src.to_vec();
    bench!("LruHashMap (capacity / 2)", {
        let mut map = LruHashMap::new(src.len() / 2);
        for (key, val) in lru_data {
            map.put(key, val);
        }
    });

    let splay_data = src.to_vec();
    bench!("SplayMap", {
        let mut map = SplayMap::new();
        for (key, val) in splay_data {
            if map.put(key, val).is_err() {
                break;
            }
        }
    });
}

/// Times `num_threads` writers filling one shared map, from the moment all
/// of them are released until the last one is done.
fn bench_shared<M, K, V, F>(name: &str, map: Arc<M>, num_threads: usize, src: &[(K, V)], put: F)
where
    M: Send + Sync + 'static,
    K: Clone + Send + 'static,
    V: Clone + Send + 'static,
    F: Fn(&M, K, V) + Send + Copy + 'static,
{
    let thread_data = partition_data(src, num_threads);
    let start_barr = Arc::new(Barrier::new(num_threads + 1));
    let end_barr = Arc::new(Barrier::new(num_threads + 1));

    let mut handles = Vec::new();
    for data in thread_data {
        let tmap = map.clone();
        let t_start_barr = start_barr.clone();
        let t_end_barr = end_barr.clone();
        handles.push(thread::spawn(move || {
            t_start_barr.wait();
            for (key, val) in data {
                put(&tmap, key, val);
            }
            t_end_barr.wait();
        }));
    }

    start_barr.wait();
    let now = Instant::now();
    end_barr.wait();
    let elapsed = now.elapsed();
    println!("{} multithreaded elapsed: {:.2?}", name, elapsed);

    for h in handles {
        h.join().unwrap();
    }
}

fn bench_multi_threaded<K, V>(num_threads: usize, src: &[(K, V)])
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    println!("bench multi threaded");

    bench_shared(
        "ConcurrentBoundedMap",
        Arc::new(ConcurrentBoundedMap::new(src.len())),
        num_threads,
        src,
        |map: &ConcurrentBoundedMap<K, V>, key, val| {
            map.put(key, val);
        },
    );

    bench_shared(
        "DashMap",
        Arc::new(DashMap::new()),
        num_threads,
        src,
        |map: &DashMap<K, V>, key, val| {
            map.insert(key, val);
        },
    );
}

fn main() {
    let input = make_random_string_pairs(NUM_ENTRIES);
    bench_single_threaded(&input);
    bench_multi_threaded(NUM_THREADS, &input);
}
