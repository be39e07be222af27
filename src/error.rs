// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Error type for all mapmaker-related errors. This should be the *only*
//! error enum that is publicly visible.

use thiserror::Error;

use crate::{dof::DofError, grouping::GroupingError, rangelist::RangelistError};

/// The *only* publicly visible error from this crate.
#[derive(Error, Debug)]
pub enum MapmakerError {
    /// An error related to the degrees-of-freedom packer.
    #[error("DOF error: {0}")]
    Dof(String),

    /// An error related to rangelists or multiranges.
    #[error("rangelist error: {0}")]
    Rangelist(String),

    /// An error related to preconditioner construction or application.
    #[error("preconditioner error: {0}")]
    Preconditioner(String),

    /// An error related to equation-system construction.
    #[error("equation system error: {0}")]
    Eqsys(String),

    /// An error related to scan grouping or effective-scan synthesis.
    #[error("scan grouping error: {0}")]
    Grouping(String),

    /// An error from a persisted-output collaborator.
    #[error("write error: {0}")]
    Write(String),
}

impl From<DofError> for MapmakerError {
    fn from(e: DofError) -> Self {
        MapmakerError::Dof(e.to_string())
    }
}

impl From<RangelistError> for MapmakerError {
    fn from(e: RangelistError) -> Self {
        MapmakerError::Rangelist(e.to_string())
    }
}

impl From<GroupingError> for MapmakerError {
    fn from(e: GroupingError) -> Self {
        MapmakerError::Grouping(e.to_string())
    }
}

impl From<PreconditionerError> for MapmakerError {
    fn from(e: PreconditionerError) -> Self {
        MapmakerError::Preconditioner(e.to_string())
    }
}

impl From<EqsysError> for MapmakerError {
    fn from(e: EqsysError) -> Self {
        MapmakerError::Eqsys(e.to_string())
    }
}

impl From<WriteError> for MapmakerError {
    fn from(e: WriteError) -> Self {
        MapmakerError::Write(e.to_string())
    }
}

/// Errors surfaced while building or applying a preconditioner.
#[derive(Error, Debug)]
pub enum PreconditionerError {
    #[error("unknown preconditioner name: {0}")]
    UnknownName(String),

    #[error("scan group is empty, cannot build a preconditioner from it")]
    EmptyScanGroup,

    #[error("numerical failure while constructing preconditioner: {0}")]
    Numerical(String),
}

/// Errors surfaced while constructing an equation system.
#[derive(Error, Debug)]
pub enum EqsysError {
    #[error("signal '{0}' is a cut signal but is not first in the signal list")]
    CutSignalNotFirst(String),

    #[error("no signals were registered")]
    NoSignals,
}

/// Errors surfaced by a [`crate::writer::MapWriter`] or
/// [`crate::writer::JunkWriter`] implementation.
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("failed to write output to '{path}': {message}")]
    Failed { path: String, message: String },
}
