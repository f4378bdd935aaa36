mod common;

use common::{config, init_tracing, Log, Recorder, IDLE};

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::time::{Duration, Instant};

use strand_core::{Chain, Condition, EventType, JobState, Stream};
use strand_runtime::{BufferedStream, Descriptor, FdEndpoint, Multiplexer};

/// Writes back whatever it can read
struct Echo;

impl Echo {
    fn pump(chain: &mut Chain<'_>) -> Condition {
        let mut buf = [0u8; 256];
        loop {
            let (n, cond) = chain.read(&mut buf);
            if n > 0 {
                let (_, wcond) = chain.write(&buf[..n]);
                if wcond.is_terminal() {
                    return wcond;
                }
            }
            if cond != Condition::Ok {
                return if cond == Condition::Wait { Condition::Ok } else { cond };
            }
        }
    }
}

impl Stream for Echo {
    fn name(&self) -> &str {
        "echo"
    }

    fn event(&mut self, event: EventType, chain: &mut Chain<'_>) -> Condition {
        match event {
            EventType::Readable => Self::pump(chain),
            _ => Condition::Ok,
        }
    }
}

fn wait_for<F: Fn() -> bool>(f: F) -> bool {
    let deadline = Instant::now() + IDLE;
    while Instant::now() < deadline {
        if f() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn test_socket_echo_through_poller() {
    init_tracing();
    let mux = Multiplexer::new(config(2)).unwrap();
    mux.start().unwrap();

    let (local, mut remote) = UnixStream::pair().unwrap();
    let mut d = Descriptor::new(FdEndpoint::from_unix(local).unwrap());
    d.add_stream(BufferedStream::new(mux.config().buffer_size)).unwrap();
    d.add_stream(Echo).unwrap();
    let id = mux.register(d).unwrap();

    remote.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    for msg in [&b"ping"[..], b"second message"] {
        remote.write_all(msg).unwrap();
        let mut got = vec![0u8; msg.len()];
        remote.read_exact(&mut got).unwrap();
        assert_eq!(got, msg);
    }

    // Peer hang-up reads as End and purges the job
    drop(remote);
    assert!(wait_for(|| mux.job_state(id) == Some(JobState::Purged)));
    mux.shutdown();
}

#[test]
fn test_pipe_end_closes_descriptor() {
    init_tracing();
    let mux = Multiplexer::new(config(1)).unwrap();
    mux.start().unwrap();
    let log = Log::default();

    let (reader, writer) = FdEndpoint::pipe().unwrap();
    let mut d = Descriptor::new(reader);
    d.add_stream(Echo).unwrap();
    d.add_stream(Recorder::new("top", &log)).unwrap();
    let id = mux.register(d).unwrap();
    assert!(mux.wait_idle(IDLE));

    drop(writer);
    assert!(wait_for(|| mux.job_state(id) == Some(JobState::Purged)));
    assert_eq!(log.lock().last().map(String::as_str), Some("top:closing"));
}
