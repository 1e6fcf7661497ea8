use crate::defs::{ProfileMode, FRAME_CACHE_SIZE};
use crate::error::{Error, Result};
use crate::structs::{Frame, Metrics, Sample};
use cached::proc_macro::cached;
use cached::SizedCache;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // P<pid>;T<tid>[;<module>:<function>:<line>]* <metrics>
    // the lazy frames group leaves every trailing number to the metrics.
    static ref SAMPLE_RE: Regex = Regex::new(
        r"^P(?P<pid>\d+);T(?P<tid>[^;\s]+)(?P<frames>;.*?)?\s+(?P<metrics>-?\d+(?:[ ,]+-?\d+)*)\s*$"
    )
    .expect("sample regex");
}

// frames repeat across nearly every record of a session.
#[cached(
    ty = "SizedCache<String, Option<Frame>>",
    create = "{ SizedCache::with_size(FRAME_CACHE_SIZE) }",
    convert = r#"{ raw.to_string() }"#
)]
fn parse_frame(raw: &str) -> Option<Frame> {
    // split from the right, module paths may carry a drive letter.
    let mut parts = raw.rsplitn(3, ':');
    let line = parts.next()?.trim().parse().ok()?;
    let function = parts.next()?;
    let module = parts.next()?;
    if function.is_empty() || module.is_empty() {
        return None;
    }
    Some(Frame::new(function, module, line))
}

fn parse_metrics(raw: &str, mode: ProfileMode) -> Option<Metrics> {
    let values = raw
        .split(|c: char| c == ' ' || c == ',')
        .filter(|v| !v.is_empty())
        .map(str::parse::<i64>)
        .collect::<Result<Vec<_>, _>>()
        .ok()?;

    match (values.as_slice(), mode) {
        // a memory-only profiler reports one signed counter.
        ([memory], ProfileMode::Memory) => Some(Metrics {
            memory_alloc: *memory,
            ..Default::default()
        }),
        ([time], _) => Some(Metrics {
            time: u64::try_from(*time).ok()?,
            ..Default::default()
        }),
        ([time, alloc, dealloc], _) => Some(Metrics {
            time: u64::try_from(*time).ok()?,
            memory_alloc: *alloc,
            memory_dealloc: if mode.tracks_deallocations() {
                *dealloc
            } else {
                0
            },
        }),
        _ => None,
    }
}

impl Sample {
    /// Parses one record emitted by the profiler.
    pub fn parse(record: &str, mode: ProfileMode) -> Result<Sample> {
        let caps = SAMPLE_RE
            .captures(record)
            .ok_or_else(|| Error::invalid_sample(record, "unrecognised layout"))?;

        let pid = caps["pid"]
            .parse()
            .map_err(|_| Error::invalid_sample(record, "bad process id"))?;
        let tid = caps["tid"].to_string();

        let frames = match caps.name("frames") {
            Some(frames) => frames.as_str()[1..]
                .split(';')
                .map(|raw| parse_frame(raw).ok_or_else(|| Error::invalid_sample(record, "bad frame")))
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        let metrics = parse_metrics(&caps["metrics"], mode)
            .ok_or_else(|| Error::invalid_sample(record, "bad metrics"))?;

        Ok(Sample {
            pid,
            tid,
            frames,
            metrics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_time_sample() {
        let sample = Sample::parse(
            "P42;T7f3a;/src/app/main.py:<module>:1;/src/app/work.py:crunch:17 250",
            ProfileMode::Time,
        )
        .unwrap();
        assert_eq!(sample.pid, 42);
        assert_eq!(sample.tid, "7f3a");
        assert_eq!(
            sample.frames,
            vec![
                Frame::new("<module>", "/src/app/main.py", 1),
                Frame::new("crunch", "/src/app/work.py", 17),
            ]
        );
        assert_eq!(sample.metrics.time, 250);
        assert_eq!(sample.metrics.memory_alloc, 0);
    }

    #[test]
    fn parses_full_sample_with_comma_metrics() {
        let sample = Sample::parse("P1;T0:11;m.py:f:3 10,2048,-1024", ProfileMode::Full).unwrap();
        assert_eq!(sample.tid, "0:11");
        assert_eq!(
            sample.metrics,
            Metrics {
                time: 10,
                memory_alloc: 2048,
                memory_dealloc: -1024,
            }
        );
    }

    #[test]
    fn deallocations_ignored_outside_full_mode() {
        let sample = Sample::parse("P1;T1;m.py:f:3 10 2048 -1024", ProfileMode::Time).unwrap();
        assert_eq!(sample.metrics.memory_alloc, 2048);
        assert_eq!(sample.metrics.memory_dealloc, 0);
    }

    #[test]
    fn memory_mode_reads_single_signed_counter() {
        let sample = Sample::parse("P1;T1;m.py:f:3 -512", ProfileMode::Memory).unwrap();
        assert_eq!(sample.metrics.time, 0);
        assert_eq!(sample.metrics.memory_alloc, -512);
    }

    #[test]
    fn module_paths_keep_their_colons_and_spaces() {
        let sample = Sample::parse(
            r"P1;T1;C:\My Tests\test_io.py:test_read:12 5",
            ProfileMode::Time,
        )
        .unwrap();
        assert_eq!(
            sample.frames,
            vec![Frame::new("test_read", r"C:\My Tests\test_io.py", 12)]
        );
    }

    #[test]
    fn accepts_sample_without_frames() {
        let sample = Sample::parse("P1;T1 100", ProfileMode::Time).unwrap();
        assert!(sample.frames.is_empty());
        assert_eq!(sample.metrics.time, 100);
    }

    #[test]
    fn rejects_malformed_records() {
        for record in [
            "",
            "garbage",
            "P1;T1;m.py:f:3",
            "Px;T1;m.py:f:3 10",
            "P1;T1;m.py:f 10",
            "P1;T1;m.py:f:x 10",
            "P1;T1;m.py::3 10",
            "P1;T1;m.py:f:3 10 20",
            "P1;T1;m.py:f:3 -10",
        ] {
            let err = Sample::parse(record, ProfileMode::Time).unwrap_err();
            assert!(matches!(err, Error::InvalidSample(_)), "{record:?}");
        }
    }
}
