//! Trace writer: a TSV with a header line naming every column supplied by
//! the leaf agent, one row per tick, monotone by time.
//!
//! Rows are not written to the sink immediately: `write_row` hands them to a
//! [`Logger`](crate::Logger), which batches up to 1024 rows before its action
//! fires, the same buffering `Registry`/`Logger<T>` give any other named log.
//! A write error from the sink is sticky (stored, then surfaced to the next
//! caller) since the action closure itself cannot return a `Result`.

use crate::Logger;
use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Column schema for a trace stream, fixed for the lifetime of a run.
#[derive(Clone, Debug)]
pub struct TraceSchema {
    names: Vec<String>,
}

impl TraceSchema {
    pub fn new(names: Vec<String>) -> Self {
        TraceSchema { names }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

fn render_row(values: &[f64]) -> String {
    let mut rendered = String::with_capacity(values.len() * 12);
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            rendered.push('\t');
        }
        if v.is_nan() {
            rendered.push_str("nan");
        } else {
            rendered.push_str(&format!("{:.6}", v));
        }
    }
    rendered
}

/// Writes trace rows to any `io::Write` destination (a file, in tests a
/// `Vec<u8>`), enforcing that rows are monotone non-decreasing in time and
/// match the declared column count. Buffers rows through a [`Logger`] and
/// only touches the sink when the buffer fills or `flush` is called.
pub struct TraceWriter<W: Write> {
    schema: TraceSchema,
    logger: Logger<Vec<f64>>,
    sink_error: Rc<RefCell<Option<io::Error>>>,
    sink: Rc<RefCell<W>>,
    last_time: f64,
}

impl<W: Write + 'static> TraceWriter<W> {
    pub fn new(schema: TraceSchema, sink: W) -> Self {
        let sink = Rc::new(RefCell::new(sink));
        let sink_error = Rc::new(RefCell::new(None));
        let header_written = Rc::new(RefCell::new(false));
        let names = schema.names.join("\t");

        let action = {
            let sink = Rc::clone(&sink);
            let sink_error = Rc::clone(&sink_error);
            let header_written = Rc::clone(&header_written);
            Box::new(move |_flushed_at: &Duration, batch: &[(Duration, Vec<f64>)]| {
                if batch.is_empty() || sink_error.borrow().is_some() {
                    return;
                }
                let mut sink = sink.borrow_mut();
                if let Err(e) = (|| -> io::Result<()> {
                    if !*header_written.borrow() {
                        writeln!(sink, "{names}")?;
                    }
                    for (_, row) in batch {
                        writeln!(sink, "{}", render_row(row))?;
                    }
                    Ok(())
                })() {
                    *sink_error.borrow_mut() = Some(e);
                } else {
                    *header_written.borrow_mut() = true;
                }
            })
        };

        TraceWriter {
            schema,
            logger: Logger::new(Instant::now(), action),
            sink_error,
            sink,
            last_time: f64::NEG_INFINITY,
        }
    }

    fn check_sink_error(&self) -> io::Result<()> {
        if let Some(e) = self.sink_error.borrow_mut().take() {
            return Err(e);
        }
        Ok(())
    }

    /// Appends one row. `time` is the tick's monotonic timestamp in seconds;
    /// `values` must have the same length as the schema, in column order.
    ///
    /// Panics (a programmer-error `ordering` condition, per the §7 taxonomy
    /// this crate does not itself enforce as a `Result` since trace writing
    /// is entirely internal to a correctly-driven controller loop) if the
    /// row count mismatches the schema or if `time` regresses.
    pub fn write_row(&mut self, time: f64, values: &[f64]) -> io::Result<()> {
        assert_eq!(values.len(), self.schema.len(), "trace row length must match schema");
        assert!(time >= self.last_time, "trace rows must be monotone by time");
        self.last_time = time;
        self.logger.log(values.to_vec());
        self.check_sink_error()
    }

    /// Flushes any rows buffered so far and the underlying sink.
    pub fn flush(&mut self) -> io::Result<()> {
        self.logger.flush();
        self.check_sink_error()?;
        self.sink.borrow_mut().flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_then_rows() {
        let schema = TraceSchema::new(vec!["time".into(), "power".into()]);
        let buf = Rc::new(RefCell::new(Vec::new()));
        let mut w = TraceWriter::new(schema, SharedBuf(Rc::clone(&buf)));
        w.write_row(0.0, &[0.0, 12.5]).unwrap();
        w.write_row(0.005, &[0.005, 13.0]).unwrap();
        w.flush().unwrap();
        let text = String::from_utf8(buf.borrow().clone()).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), "time\tpower");
        assert_eq!(lines.next().unwrap(), "0.000000\t12.500000");
        assert_eq!(lines.next().unwrap(), "0.005000\t13.000000");
    }

    #[test]
    fn nan_rendered_literally() {
        let schema = TraceSchema::new(vec!["x".into()]);
        let buf = Rc::new(RefCell::new(Vec::new()));
        let mut w = TraceWriter::new(schema, SharedBuf(Rc::clone(&buf)));
        w.write_row(0.0, &[f64::NAN]).unwrap();
        w.flush().unwrap();
        assert!(String::from_utf8(buf.borrow().clone()).unwrap().contains("nan"));
    }

    #[test]
    #[should_panic(expected = "monotone")]
    fn rejects_non_monotone_time() {
        let schema = TraceSchema::new(vec!["x".into()]);
        let mut w = TraceWriter::new(schema, Vec::new());
        w.write_row(1.0, &[0.0]).unwrap();
        let _ = w.write_row(0.5, &[0.0]);
    }

    /// A `Write` handle over a shared buffer, so tests can observe what the
    /// logger's action closure wrote after `TraceWriter` takes ownership of
    /// the sink it's given.
    struct SharedBuf(Rc<RefCell<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().write(buf)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }
}
