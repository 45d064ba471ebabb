// crates/hc_exchange/src/collector.rs

//! 交换记录
//!
//! 按模拟时间记录被记录交换写入目标视图的值。同一时间重复记录时只保留
//! 最后一次（迭代耦合中同一步可能多次交换）；时间前进时把上一行写出，
//! `finalize` 时写出最后一行。

use crate::error::ExchangeError;
use hc_config::{ExchangeLogConfig, LogSinkKind, PathResolver};
use hc_foundation::TIME_TOLERANCE;
use hc_kernel::VariableView;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// 一行记录
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedRow {
    /// 模拟时间
    pub time: f64,
    /// 值
    pub values: Vec<f64>,
}

fn same_time(a: f64, b: f64) -> bool {
    (a - b).abs() <= TIME_TOLERANCE * a.abs().max(1.0)
}

/// 记录存储
pub trait ExchangeSink {
    /// 记录一行
    fn record(&mut self, time: f64, values: &[f64]) -> Result<(), ExchangeError>;

    /// 写出缓存内容
    fn finish(&mut self) -> Result<(), ExchangeError>;

    /// 已记录的行（仅内存存储提供）
    fn rows(&self) -> Option<Vec<LoggedRow>> {
        None
    }
}

/// CSV 文件存储，每个交换一个文件，表头为 `time,0,1,...`
pub struct CsvSink {
    path: PathBuf,
    writer: Option<csv::Writer<File>>,
    pending: Option<LoggedRow>,
}

impl CsvSink {
    /// 创建存储（文件在第一次写出时创建）
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: None,
            pending: None,
        }
    }

    /// 文件路径
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn error(&self, message: impl ToString) -> ExchangeError {
        ExchangeError::Collector {
            path: self.path.clone(),
            message: message.to_string(),
        }
    }

    fn write_row(&mut self, row: &LoggedRow) -> Result<(), ExchangeError> {
        if self.writer.is_none() {
            let mut writer = csv::Writer::from_path(&self.path).map_err(|e| self.error(e))?;
            let mut header = vec!["time".to_string()];
            header.extend((0..row.values.len()).map(|i| i.to_string()));
            writer.write_record(&header).map_err(|e| self.error(e))?;
            self.writer = Some(writer);
        }
        let mut record = vec![row.time.to_string()];
        record.extend(row.values.iter().map(f64::to_string));
        let result = match self.writer.as_mut() {
            Some(w) => w.write_record(&record),
            None => Ok(()),
        };
        result.map_err(|e| self.error(e))
    }
}

impl ExchangeSink for CsvSink {
    fn record(&mut self, time: f64, values: &[f64]) -> Result<(), ExchangeError> {
        match self.pending.take() {
            Some(prev) if !same_time(prev.time, time) => self.write_row(&prev)?,
            _ => {}
        }
        self.pending = Some(LoggedRow {
            time,
            values: values.to_vec(),
        });
        Ok(())
    }

    fn finish(&mut self) -> Result<(), ExchangeError> {
        if let Some(row) = self.pending.take() {
            self.write_row(&row)?;
        }
        let result = match self.writer.as_mut() {
            Some(w) => w.flush(),
            None => Ok(()),
        };
        result.map_err(|e| self.error(e))
    }
}

/// 内存存储，可克隆的句柄共享同一份记录
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    rows: Arc<Mutex<Vec<LoggedRow>>>,
}

impl MemorySink {
    /// 创建空存储
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录快照
    pub fn snapshot(&self) -> Vec<LoggedRow> {
        self.rows.lock().clone()
    }
}

impl ExchangeSink for MemorySink {
    fn record(&mut self, time: f64, values: &[f64]) -> Result<(), ExchangeError> {
        let mut rows = self.rows.lock();
        match rows.last_mut() {
            Some(last) if same_time(last.time, time) => last.values = values.to_vec(),
            _ => rows.push(LoggedRow {
                time,
                values: values.to_vec(),
            }),
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), ExchangeError> {
        Ok(())
    }

    fn rows(&self) -> Option<Vec<LoggedRow>> {
        Some(self.snapshot())
    }
}

/// 交换记录器
#[derive(Default)]
pub struct ExchangeCollector {
    sinks: BTreeMap<String, Box<dyn ExchangeSink>>,
}

impl ExchangeCollector {
    /// 创建空记录器
    pub fn new() -> Self {
        Self::default()
    }

    /// 按配置创建，输出目录不存在时自动创建
    pub fn from_config(config: &ExchangeLogConfig, paths: &PathResolver) -> Result<Self, ExchangeError> {
        let mut collector = Self::new();
        let needs_dir = config.exchanges.values().any(|k| *k == LogSinkKind::Csv);
        let output_dir = paths.resolve(&config.output_dir);
        if needs_dir {
            std::fs::create_dir_all(&output_dir)?;
        }
        for (name, kind) in &config.exchanges {
            let sink: Box<dyn ExchangeSink> = match kind {
                LogSinkKind::Csv => Box::new(CsvSink::new(output_dir.join(format!("{name}.csv")))),
                LogSinkKind::Memory => Box::new(MemorySink::new()),
            };
            collector.add_sink(name.clone(), sink);
        }
        tracing::info!(
            "Exchange logging enabled for {} exchanges in {}",
            collector.sinks.len(),
            output_dir.display()
        );
        Ok(collector)
    }

    /// 为交换添加存储
    pub fn add_sink(&mut self, exchange: impl Into<String>, sink: Box<dyn ExchangeSink>) {
        self.sinks.insert(exchange.into(), sink);
    }

    /// 该交换是否被记录
    pub fn is_logged(&self, exchange: &str) -> bool {
        self.sinks.contains_key(exchange)
    }

    /// 记录一组值；未配置存储的交换被忽略
    pub fn log_values(&mut self, exchange: &str, time: f64, values: &[f64]) -> Result<(), ExchangeError> {
        match self.sinks.get_mut(exchange) {
            Some(sink) => sink.record(time, values),
            None => Ok(()),
        }
    }

    /// 记录目标视图的当前值
    pub fn log_exchange(
        &mut self,
        exchange: &str,
        time: f64,
        target: &VariableView<f64>,
    ) -> Result<(), ExchangeError> {
        if !self.is_logged(exchange) {
            return Ok(());
        }
        let values = target.to_vec()?;
        self.log_values(exchange, time, &values)
    }

    /// 已记录的行（仅内存存储）
    pub fn rows(&self, exchange: &str) -> Option<Vec<LoggedRow>> {
        self.sinks.get(exchange).and_then(|s| s.rows())
    }

    /// 写出全部缓存，返回第一个错误
    pub fn finalize(&mut self) -> Result<(), ExchangeError> {
        let mut first = None;
        for (name, sink) in self.sinks.iter_mut() {
            if let Err(e) = sink.finish() {
                tracing::error!("Exchange log '{}' failed to flush: {}", name, e);
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }
}
