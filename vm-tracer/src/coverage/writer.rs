//! Coverage session log and script artifacts

use super::{ExecutedScript, SESSION_EXTENSION};
use crate::error::TracerError;
use crate::storage::{FileStorage, FileStream};
use crate::Result;
use std::collections::HashSet;
use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use trace_codec::UInt160;

/// Writes the artifacts of one coverage session
///
/// The session log holds one entry per line:
///
/// ```text
/// 0x<script hash>          a script became current
/// 0x0000…0000              control returned above the outermost frame
/// <ip>                     an instruction was executed
/// <ip> <offset> <outcome>  a conditional branch was resolved
/// ```
pub struct CoverageWriter {
    storage: Arc<dyn FileStorage>,
    directory: PathBuf,
    session_id: String,
    log_path: PathBuf,
    log: Option<FileStream>,
    /// Scripts whose artifact was written or found on disk this session
    written: HashSet<UInt160>,
}

impl CoverageWriter {
    /// Start a session in `directory`, creating it if needed
    pub fn open(storage: Arc<dyn FileStorage>, directory: impl Into<PathBuf>) -> Result<Self> {
        let directory = directory.into();
        storage
            .create_dir_all(&directory)
            .map_err(|err| TracerError::io(&directory, err))?;

        let session_id = hex::encode(rand::random::<[u8; 16]>());
        let log_path = directory.join(format!("{session_id}.{SESSION_EXTENSION}"));
        let log = storage
            .create_new(&log_path)
            .map_err(|err| TracerError::io(&log_path, err))?;

        tracing::info!("Coverage session {} writing to {}", session_id, directory.display());

        Ok(Self {
            storage,
            directory,
            session_id,
            log_path,
            log: Some(log),
            written: HashSet::new(),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn is_closed(&self) -> bool {
        self.log.is_none()
    }

    /// Record that `script` became the current script, or with `None` that
    /// control returned above the outermost frame
    ///
    /// The first time a script is seen its artifact is written, unless a file
    /// with that name already exists in the directory.
    pub fn record_context(&mut self, script: Option<&ExecutedScript>) -> Result<()> {
        let Some(script) = script else {
            return self.write_line(format_args!("{}", UInt160::ZERO));
        };

        let hash = script.hash();
        self.write_line(format_args!("{hash}"))?;
        if !self.written.contains(&hash) {
            self.write_artifact(script)?;
            self.written.insert(hash);
        }
        Ok(())
    }

    pub fn record_address(&mut self, instruction_pointer: usize) -> Result<()> {
        self.write_line(format_args!("{instruction_pointer}"))
    }

    pub fn record_branch(
        &mut self,
        instruction_pointer: usize,
        offset: usize,
        outcome: usize,
    ) -> Result<()> {
        self.write_line(format_args!("{instruction_pointer} {offset} {outcome}"))
    }

    /// Flush and release the session log
    pub fn close(&mut self) -> Result<()> {
        let mut log = self.log.take().ok_or(TracerError::SessionClosed)?;
        log.flush().map_err(|err| TracerError::io(&self.log_path, err))?;
        tracing::info!(
            "Coverage session {} closed, {} artifacts checked",
            self.session_id,
            self.written.len()
        );
        Ok(())
    }

    fn write_line(&mut self, line: fmt::Arguments<'_>) -> Result<()> {
        let log = self.log.as_mut().ok_or(TracerError::SessionClosed)?;
        writeln!(log, "{line}").map_err(|err| TracerError::io(&self.log_path, err))
    }

    /// Write the artifact of `script` unless it already exists
    ///
    /// A write that fails part way removes the file again, so a later session
    /// does not take a truncated artifact for a complete one.
    fn write_artifact(&self, script: &ExecutedScript) -> Result<()> {
        let path = self.directory.join(script.artifact_file_name());
        match self.storage.create_new(&path) {
            Ok(mut file) => {
                let written = file.write_all(&script.artifact_bytes()).and_then(|_| file.flush());
                drop(file);
                if let Err(err) = written {
                    if let Err(remove_err) = self.storage.remove_file(&path) {
                        tracing::warn!(
                            "Failed to remove partial coverage artifact {}: {}",
                            path.display(),
                            remove_err
                        );
                    }
                    return Err(TracerError::io(&path, err));
                }
                tracing::debug!("Wrote coverage artifact {}", path.display());
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                tracing::debug!("Coverage artifact {} already present", path.display());
                Ok(())
            }
            Err(err) => Err(TracerError::io(&path, err)),
        }
    }
}

impl fmt::Debug for CoverageWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoverageWriter")
            .field("directory", &self.directory)
            .field("session_id", &self.session_id)
            .field("closed", &self.is_closed())
            .field("written", &self.written.len())
            .finish()
    }
}
