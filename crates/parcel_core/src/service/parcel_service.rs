//! Parcel lifecycle service.
//!
//! # Responsibility
//! - Register parcels with a creation timestamp and initial status.
//! - Enforce the shipment status flow and modification rules the store
//!   deliberately leaves to callers.
//!
//! # Invariants
//! - Status advances one step at a time: `registered -> sent -> delivered`.
//! - Address changes and deletion only apply to `registered` parcels.
//! - Guards and writes run as one conditional statement, so a status change by
//!   another connection is reported instead of overwritten.
//! - Service layer remains storage-agnostic.

use crate::model::parcel::{ClientId, Parcel, ParcelNumber, ParcelStatus};
use crate::repo::parcel_repo::{ParcelStore, RepoError};
use chrono::{SecondsFormat, Utc};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Errors from parcel lifecycle operations.
#[derive(Debug)]
pub enum ServiceError {
    /// Address is blank after trim.
    InvalidAddress,
    /// Target parcel does not exist.
    NotFound(ParcelNumber),
    /// Parcel is already in a terminal status.
    InvalidTransition {
        number: ParcelNumber,
        from: ParcelStatus,
    },
    /// Parcel left `registered` and can no longer be changed or deleted.
    NotModifiable {
        number: ParcelNumber,
        status: ParcelStatus,
    },
    /// Status changed between the read and the guarded write.
    Conflict {
        number: ParcelNumber,
        expected: ParcelStatus,
        actual: ParcelStatus,
    },
    /// Store-level failure.
    Repo(RepoError),
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidAddress => write!(f, "parcel address must not be blank"),
            Self::NotFound(number) => write!(f, "parcel not found: {number}"),
            Self::InvalidTransition { number, from } => {
                write!(f, "parcel {number} has no status after `{from}`")
            }
            Self::NotModifiable { number, status } => write!(
                f,
                "parcel {number} is `{status}`; only registered parcels can be modified"
            ),
            Self::Conflict {
                number,
                expected,
                actual,
            } => write!(
                f,
                "parcel {number} changed concurrently: expected `{expected}`, found `{actual}`"
            ),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(number) => Self::NotFound(number),
            other => Self::Repo(other),
        }
    }
}

/// Use-case wrapper over a [`ParcelStore`].
pub struct ParcelService<S: ParcelStore> {
    store: S,
}

impl<S: ParcelStore> ParcelService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Registers a new parcel for `client` at `address`.
    ///
    /// # Contract
    /// - Status starts as `registered`.
    /// - `created_at` is the current UTC time in RFC 3339 with second precision.
    /// - Returns the stored parcel including its assigned number.
    pub fn register(&self, client: ClientId, address: &str) -> ServiceResult<Parcel> {
        let address = normalize_address(address)?;
        let created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        let mut parcel = Parcel::new(client, ParcelStatus::Registered, address, created_at);
        parcel.number = self.store.add(&parcel)?;

        info!(
            "event=parcel_register module=service status=ok number={} client={}",
            parcel.number, client
        );
        Ok(parcel)
    }

    /// Lists parcels owned by `client`.
    pub fn client_parcels(&self, client: ClientId) -> ServiceResult<Vec<Parcel>> {
        Ok(self.store.get_by_client(client)?)
    }

    /// Loads one parcel.
    pub fn parcel(&self, number: ParcelNumber) -> ServiceResult<Parcel> {
        Ok(self.store.get(number)?)
    }

    /// Advances the parcel to its next status and returns it.
    ///
    /// The write only applies while the status is still the one that was read.
    pub fn next_status(&self, number: ParcelNumber) -> ServiceResult<ParcelStatus> {
        let parcel = self.store.get(number)?;
        let next = parcel
            .status
            .next()
            .ok_or(ServiceError::InvalidTransition {
                number,
                from: parcel.status,
            })?;
        if !self.store.set_status_if(number, parcel.status, next)? {
            return Err(self.rejected_transition(number, parcel.status));
        }

        info!(
            "event=parcel_next_status module=service status=ok number={} from={} to={}",
            number, parcel.status, next
        );
        Ok(next)
    }

    /// Replaces the delivery address of a registered parcel.
    pub fn change_address(&self, number: ParcelNumber, address: &str) -> ServiceResult<()> {
        let address = normalize_address(address)?;
        if !self
            .store
            .set_address_if(number, ParcelStatus::Registered, address)?
        {
            return Err(self.rejected_modification(number));
        }

        info!("event=parcel_change_address module=service status=ok number={number}");
        Ok(())
    }

    /// Deletes a registered parcel.
    pub fn delete(&self, number: ParcelNumber) -> ServiceResult<()> {
        if !self.store.delete_if(number, ParcelStatus::Registered)? {
            return Err(self.rejected_modification(number));
        }

        info!("event=parcel_delete module=service status=ok number={number}");
        Ok(())
    }

    /// Reports a status write that lost to a concurrent change.
    fn rejected_transition(&self, number: ParcelNumber, expected: ParcelStatus) -> ServiceError {
        match self.store.get(number) {
            Ok(parcel) => write_conflict(number, expected, parcel.status),
            Err(err) => err.into(),
        }
    }

    /// Reports an address change or delete that matched no registered parcel.
    fn rejected_modification(&self, number: ParcelNumber) -> ServiceError {
        match self.store.get(number) {
            Ok(parcel) if !parcel.status.is_modifiable() => ServiceError::NotModifiable {
                number,
                status: parcel.status,
            },
            Ok(parcel) => write_conflict(number, ParcelStatus::Registered, parcel.status),
            Err(err) => err.into(),
        }
    }
}

fn write_conflict(
    number: ParcelNumber,
    expected: ParcelStatus,
    actual: ParcelStatus,
) -> ServiceError {
    warn!(
        "event=parcel_write_conflict module=service status=error number={} expected={} actual={}",
        number, expected, actual
    );
    ServiceError::Conflict {
        number,
        expected,
        actual,
    }
}

fn normalize_address(address: &str) -> ServiceResult<&str> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::InvalidAddress);
    }
    Ok(trimmed)
}
