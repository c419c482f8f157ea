//! Built-in listener that records selected variables as delimited text.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::sim::listener::{SimulationListener, StepContext};
use crate::value::ValueType;
use crate::variable::VariableId;

/// Variable selection and row cadence for a [`CsvRecorder`].
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    patterns: Vec<VariableId>,
    decimation_factor: u64,
    mandatory: bool,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            decimation_factor: 1,
            mandatory: false,
        }
    }
}

impl RecorderConfig {
    /// Records every declared variable on every iteration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts recording to identifiers matching `pattern`
    /// (`*`/`?` wildcards allowed in either component).
    pub fn record_variable(mut self, pattern: &str) -> Result<Self> {
        self.patterns.push(VariableId::parse(pattern)?);
        Ok(self)
    }

    /// Emits one row every `factor` iterations instead of every iteration.
    pub fn with_decimation_factor(mut self, factor: u64) -> Result<Self> {
        if factor < 1 {
            return Err(Error::InvalidDecimationFactor);
        }
        self.decimation_factor = factor;
        Ok(self)
    }

    /// When set, a write failure aborts the simulation step instead of
    /// being logged and ignored.
    pub fn mandatory(mut self, flag: bool) -> Self {
        self.mandatory = flag;
        self
    }

    /// Loads a configuration from a TOML file.
    pub fn from_toml_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    /// Parses a configuration from TOML text:
    ///
    /// ```toml
    /// decimation_factor = 5
    /// mandatory = false
    /// variables = ["chassis::z*", "wheel::omega"]
    /// ```
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let file: RawRecorderConfig = toml::from_str(raw)
            .map_err(|err| Error::InvalidConfig(format!("invalid recorder config: {err}")))?;

        let mut config = Self::new().mandatory(file.mandatory.unwrap_or(false));
        if let Some(factor) = file.decimation_factor {
            config = config.with_decimation_factor(factor)?;
        }
        for pattern in file.variables.unwrap_or_default() {
            config = config.record_variable(&pattern)?;
        }
        Ok(config)
    }

    fn should_record(&self, id: &VariableId) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|p| id.matches(p))
    }
}

#[derive(Deserialize)]
struct RawRecorderConfig {
    decimation_factor: Option<u64>,
    mandatory: Option<bool>,
    variables: Option<Vec<String>>,
}

/// Post-step listener serializing selected variables to a CSV sink.
///
/// The header row is `time` followed by one column per recorded identifier
/// suffixed with its type marker (e.g. `chassis::zChassis[REAL]`). One data
/// row is written every `decimation_factor` iterations, including the
/// iteration-0 row capturing the state right after `init`. Output is
/// flushed when the engine terminates.
pub struct CsvRecorder {
    writer: csv::Writer<Box<dyn Write + Send>>,
    path: Option<PathBuf>,
    config: RecorderConfig,
    columns: Vec<(VariableId, ValueType)>,
    header_written: bool,
}

impl std::fmt::Debug for CsvRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvRecorder")
            .field("path", &self.path)
            .field("config", &self.config)
            .field("columns", &self.columns)
            .field("header_written", &self.header_written)
            .finish_non_exhaustive()
    }
}

impl CsvRecorder {
    /// Creates a recorder writing to a `.csv` file, creating missing parent
    /// directories.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if path.extension().and_then(|e| e.to_str()) != Some("csv") {
            return Err(Error::InvalidConfig(format!(
                "recorder file extension must be .csv, was '{}'",
                path.display()
            )));
        }
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let writer = Self::open_file(&path)?;
        Ok(Self {
            writer,
            path: Some(path),
            config: RecorderConfig::default(),
            columns: Vec::new(),
            header_written: false,
        })
    }

    /// Creates a recorder writing to an arbitrary sink.
    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: csv::WriterBuilder::new().from_writer(Box::new(writer)),
            path: None,
            config: RecorderConfig::default(),
            columns: Vec::new(),
            header_written: false,
        }
    }

    pub fn with_config(mut self, config: RecorderConfig) -> Self {
        self.config = config;
        self
    }

    fn open_file(path: &Path) -> Result<csv::Writer<Box<dyn Write + Send>>> {
        let file = File::create(path)?;
        let sink: Box<dyn Write + Send> = Box::new(BufWriter::new(file));
        Ok(csv::WriterBuilder::new().from_writer(sink))
    }

    /// Resolves the recorded column set and writes the header row.
    fn write_header(&mut self, ctx: &StepContext<'_>) -> Result<()> {
        let declared = ctx.identifiers();
        self.columns = declared
            .iter()
            .filter(|(id, _)| self.config.should_record(id))
            .cloned()
            .collect();

        for pattern in &self.config.patterns {
            if !declared.iter().any(|(id, _)| id.matches(pattern)) {
                warn!(%pattern, "no declared variable matches recording pattern");
            }
        }

        let mut record = vec!["time".to_string()];
        record.extend(
            self.columns
                .iter()
                .map(|(id, ty)| format!("{id}[{}]", ty.marker())),
        );
        self.writer.write_record(&record).map_err(csv_error)?;
        self.header_written = true;
        Ok(())
    }

    fn write_row(&mut self, ctx: &StepContext<'_>) -> Result<()> {
        if !self.header_written {
            self.write_header(ctx)?;
        }
        let mut record = vec![ctx.time().to_string()];
        for (id, _) in &self.columns {
            record.push(ctx.read(id)?.to_string());
        }
        self.writer.write_record(&record).map_err(csv_error)
    }

    /// Applies the mandatory-recording policy: failures abort the run only
    /// when recording is mandatory, otherwise they are logged and dropped.
    fn guard(&self, result: Result<()>) -> Result<()> {
        match result {
            Ok(()) => Ok(()),
            Err(err) if self.config.mandatory => Err(err),
            Err(err) => {
                warn!(error = %err, "recorder write failed, continuing");
                Ok(())
            }
        }
    }
}

impl SimulationListener for CsvRecorder {
    fn post_init(&mut self, ctx: &StepContext<'_>) -> Result<()> {
        let result = self.write_row(ctx);
        self.guard(result)
    }

    fn post_step(&mut self, ctx: &StepContext<'_>) -> Result<()> {
        if ctx.iteration() % self.config.decimation_factor != 0 {
            return Ok(());
        }
        let result = self.write_row(ctx);
        self.guard(result)
    }

    fn post_terminate(&mut self, _ctx: &StepContext<'_>) -> Result<()> {
        let result = self.writer.flush().map_err(Error::from);
        if let Some(path) = &self.path {
            debug!(path = %path.display(), "flushed recorded data");
        }
        self.guard(result)
    }

    fn on_reset(&mut self) -> Result<()> {
        // File-backed sinks start over; stream sinks keep appending since
        // their contents cannot be rewound.
        if let Some(path) = self.path.clone() {
            self.writer.flush()?;
            self.writer = Self::open_file(&path)?;
            self.header_written = false;
            self.columns.clear();
        }
        Ok(())
    }
}

fn csv_error(err: csv::Error) -> Error {
    Error::Io(io::Error::other(err))
}
