//! 📊 progress.rs: "Are we there yet?", asked by every backup and every restore, forever.
//!
//! 🚀 Two things live here:
//! - `ProgressMetrics`: totals, a sliding-window rate, an indicatif bar, and a comfy-table readout.
//! - `ProgressReader`: an `AsyncRead` proxy that counts bytes on their way past. It never
//!   changes them, never reorders them, never holds on to them. Observational only.
//!
//! ⚠️  Watching the bar will not make the download go faster. We have data on this.
//!
//! 🦆 The duck is not a progress indicator. Please stop asking the duck.

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::{AsyncRead, ReadBuf};

const MIB: u64 = 1024 * 1024;

// -- ⏱️ redraw at most this often. a 64 KiB read loop can call update() thousands of times a second.
const RENDER_INTERVAL: Duration = Duration::from_millis(200);

// -- 🔄 rates are computed over this trailing window so one slow part upload doesn't look like doom
const RATE_WINDOW: Duration = Duration::from_secs(5);

/// 📦 Bytes, scaled to something a human can read at a glance.
fn format_bytes(bytes: u64) -> String {
    if bytes >= MIB {
        format!("{:.2} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= 1024 {
        format!("{:.2} KiB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} bytes")
    }
}

/// 🔢 1234567 → "1,234,567"
fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// ⏱️ MM:SS, or HH:MM:SS for the long nights.
fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    match secs / 3600 {
        0 => format!("{:02}:{:02}", secs / 60, secs % 60),
        hours => format!("{:02}:{:02}:{:02}", hours, (secs % 3600) / 60, secs % 60),
    }
}

/// 📊 Totals and rates for one transfer: a backup of a database, or the download of one object.
///
/// `total_size` of 0 means "unknown" (a backup never knows how big the database is up front).
pub(crate) struct ProgressMetrics {
    label: String,
    total_size: u64,
    total_bytes: u64,
    total_docs: u64,
    progress_bar: ProgressBar,
    // -- (when, bytes so far, docs so far), oldest first
    rate_samples: VecDeque<(Instant, u64, u64)>,
    start_time: Instant,
    last_render: Option<Instant>,
}

impl std::fmt::Debug for ProgressMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- 🎭 ProgressBar has no Debug, and nobody wants a terminal widget in their logs anyway
        f.debug_struct("ProgressMetrics")
            .field("label", &self.label)
            .field("total_size", &self.total_size)
            .field("total_bytes", &self.total_bytes)
            .field("total_docs", &self.total_docs)
            .finish()
    }
}

impl ProgressMetrics {
    /// 🚀 A metrics tracker with a visible terminal bar.
    pub(crate) fn new(label: impl Into<String>, total_size: u64) -> Self {
        let progress_bar = if total_size > 0 {
            ProgressBar::new(total_size)
        } else {
            ProgressBar::new_spinner()
        };
        let template = if total_size > 0 {
            "{msg}\n| [{bar:40.cyan/blue}]"
        } else {
            "{msg}\n| {spinner}"
        };
        // -- 🎨 a bad template only costs us the styling, never the transfer
        if let Ok(style) = ProgressStyle::with_template(template) {
            progress_bar.set_style(style.progress_chars("=>-"));
        }
        Self::with_bar(label.into(), total_size, progress_bar)
    }

    /// 🙈 Same bookkeeping, nothing drawn. For `--no-progress`, and for tests.
    pub(crate) fn hidden(label: impl Into<String>, total_size: u64) -> Self {
        Self::with_bar(label.into(), total_size, ProgressBar::hidden())
    }

    fn with_bar(label: String, total_size: u64, progress_bar: ProgressBar) -> Self {
        let start_time = Instant::now();
        let mut rate_samples = VecDeque::new();
        rate_samples.push_back((start_time, 0u64, 0u64));
        Self {
            label,
            total_size,
            total_bytes: 0,
            total_docs: 0,
            progress_bar,
            rate_samples,
            start_time,
            last_render: None,
        }
    }

    /// 🔄 Account for `bytes` and `docs` more. Redraws are throttled; totals are always exact.
    pub(crate) fn update(&mut self, bytes: u64, docs: u64) {
        self.total_bytes += bytes;
        self.total_docs += docs;

        let now = Instant::now();
        let due = self
            .last_render
            .is_none_or(|last| now.duration_since(last) >= RENDER_INTERVAL);
        if due {
            self.last_render = Some(now);
            let rates = self.calculate_rates(now);
            self.render(rates);
        }
        if self.total_size > 0 {
            self.progress_bar.set_position(self.total_bytes);
        } else {
            self.progress_bar.tick();
        }
    }

    pub(crate) fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub(crate) fn total_docs(&self) -> u64 {
        self.total_docs
    }

    /// ✅ One last accurate frame, then the bar stays put.
    pub(crate) fn finish(&mut self) {
        let rates = self.calculate_rates(Instant::now());
        self.render(rates);
        self.progress_bar.finish();
    }

    /// 📈 (bytes/s, docs/s) over the trailing window.
    fn calculate_rates(&mut self, now: Instant) -> (f64, f64) {
        while let Some(&(at, _, _)) = self.rate_samples.front() {
            if now.duration_since(at) > RATE_WINDOW && self.rate_samples.len() > 1 {
                self.rate_samples.pop_front();
            } else {
                break;
            }
        }
        self.rate_samples
            .push_back((now, self.total_bytes, self.total_docs));

        let Some(&(oldest, oldest_bytes, oldest_docs)) = self.rate_samples.front() else {
            return (0.0, 0.0);
        };
        let elapsed = now.duration_since(oldest).as_secs_f64();
        if elapsed <= 0.0 {
            return (0.0, 0.0);
        }
        (
            self.total_bytes.saturating_sub(oldest_bytes) as f64 / elapsed,
            self.total_docs.saturating_sub(oldest_docs) as f64 / elapsed,
        )
    }

    /// 🎨 Render the readout into the bar's message.
    ///
    /// ```text
    /// users.bson
    ///   1.20 MiB/s     3.40 MiB / 10.00 MiB
    ///  1,024 Docs/s          12,345 Docs
    ///   00:03 elapsed    00:06 remaining
    /// | [=============>--------------------------]
    /// ```
    fn render(&self, (bytes_per_sec, docs_per_sec): (f64, f64)) {
        let elapsed = self.start_time.elapsed();
        let (progress, remaining) = if self.total_size > 0 {
            let fraction = self.total_bytes as f64 / self.total_size as f64;
            let remaining = if fraction > 0.0 && fraction < 1.0 {
                let total_estimated = elapsed.as_secs_f64() / fraction;
                format_duration(Duration::from_secs_f64(
                    (total_estimated - elapsed.as_secs_f64()).max(0.0),
                ))
            } else {
                "--:--".to_string()
            };
            (
                format!(
                    "{} / {}",
                    format_bytes(self.total_bytes),
                    format_bytes(self.total_size)
                ),
                remaining,
            )
        } else {
            // -- 🤷 unknown total: no ETA, just how far we've come
            (format_bytes(self.total_bytes), "--:--".to_string())
        };

        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.add_row(vec![
            Cell::new(format!("{:.2} MiB/s", bytes_per_sec / MIB as f64))
                .set_alignment(CellAlignment::Right),
            Cell::new(progress).set_alignment(CellAlignment::Right),
        ]);
        if self.total_docs > 0 {
            table.add_row(vec![
                Cell::new(format!("{} Docs/s", format_number(docs_per_sec as u64)))
                    .set_alignment(CellAlignment::Right),
                Cell::new(format!("{} Docs", format_number(self.total_docs)))
                    .set_alignment(CellAlignment::Right),
            ]);
        }
        table.add_row(vec![
            Cell::new(format!("{} elapsed", format_duration(elapsed)))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!("{remaining} remaining")).set_alignment(CellAlignment::Right),
        ]);

        self.progress_bar
            .set_message(format!("{}\n{}", self.label, table));
    }
}

/// 🔍 Counts bytes as they stream past, feeding a [`ProgressMetrics`].
///
/// Reads through this are byte-for-byte the reads of the inner reader.
pub(crate) struct ProgressReader<R> {
    inner: R,
    metrics: ProgressMetrics,
}

impl<R> ProgressReader<R> {
    pub(crate) fn new(inner: R, metrics: ProgressMetrics) -> Self {
        Self { inner, metrics }
    }

    pub(crate) fn metrics(&self) -> &ProgressMetrics {
        &self.metrics
    }

    /// ✅ Close out the bar and hand back the totals.
    pub(crate) fn finish(mut self) -> ProgressMetrics {
        self.metrics.finish();
        self.metrics
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ProgressReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let polled = Pin::new(&mut this.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = polled {
            let read = buf.filled().len() - before;
            if read > 0 {
                this.metrics.update(read as u64, 0);
            }
        }
        polled
    }
}
