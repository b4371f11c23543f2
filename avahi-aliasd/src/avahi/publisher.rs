//! Record group lifecycle against the mDNS responder.
//!
//! Every alias lives in its own record group and moves through
//! `Unpublished -> Populated -> Committed -> Resetting -> Released`.
//! Out-of-order steps are rejected before they reach the responder.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::protocol::{
    AVAHI_IF_UNSPEC, AVAHI_PROTO_UNSPEC, RECORD_CLASS_IN, RECORD_TTL_SECS, RECORD_TYPE_CNAME,
};

use crate::avahi::fqdn;
use crate::error::{AliasError, PublishStep, ResponderError};

/// One resource record as submitted to a record group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasRecord {
    pub interface: i32,
    pub protocol: i32,
    pub flags: u32,
    /// Owner name, i.e. the alias hostname
    pub name: String,
    pub class: u16,
    pub rtype: u16,
    pub ttl: u32,
    /// Wire-encoded CNAME target
    pub rdata: Vec<u8>,
}

impl AliasRecord {
    pub fn cname(hostname: &str, rdata: Vec<u8>) -> Self {
        Self {
            interface: AVAHI_IF_UNSPEC,
            protocol: AVAHI_PROTO_UNSPEC,
            flags: 0,
            name: hostname.to_string(),
            class: RECORD_CLASS_IN,
            rtype: RECORD_TYPE_CNAME,
            ttl: RECORD_TTL_SECS,
            rdata,
        }
    }
}

/// RPC surface of an mDNS responder that manages record groups.
///
/// Implementations must allow concurrent calls on different groups.
#[async_trait]
pub trait Responder: Send + Sync {
    /// Opaque handle to a responder-side record group
    type Group: Send + Sync;

    async fn entry_group_new(&self) -> Result<Self::Group, ResponderError>;
    async fn add_record(&self, group: &Self::Group, record: &AliasRecord) -> Result<(), ResponderError>;
    async fn commit(&self, group: &Self::Group) -> Result<(), ResponderError>;
    async fn reset(&self, group: &Self::Group) -> Result<(), ResponderError>;
    async fn free(&self, group: &Self::Group) -> Result<(), ResponderError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
    Unpublished,
    Populated,
    Committed,
    Resetting,
    Released,
}

/// A record group allocated for one alias hostname.
#[derive(Debug)]
pub struct RecordGroup<G> {
    handle: G,
    hostname: String,
    state: GroupState,
    committed_at: Option<DateTime<Utc>>,
}

impl<G> RecordGroup<G> {
    pub fn state(&self) -> GroupState {
        self.state
    }

    pub fn committed_at(&self) -> Option<DateTime<Utc>> {
        self.committed_at
    }

    fn require(&self, step: PublishStep, allowed: &[GroupState]) -> Result<(), AliasError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(AliasError::InvalidTransition { step, state: self.state })
        }
    }

    fn failed(&self, step: PublishStep, source: ResponderError) -> AliasError {
        AliasError::Publish {
            hostname: self.hostname.clone(),
            step,
            source,
        }
    }
}

/// Publishes and withdraws CNAME aliases through a [`Responder`].
pub struct AliasPublisher<R> {
    responder: R,
}

impl<R: Responder> AliasPublisher<R> {
    pub fn new(responder: R) -> Self {
        Self { responder }
    }

    /// Request an empty record group for `hostname`. Nothing is visible yet.
    pub async fn allocate(&self, hostname: &str) -> Result<RecordGroup<R::Group>, AliasError> {
        let handle = self
            .responder
            .entry_group_new()
            .await
            .map_err(|source| AliasError::Publish {
                hostname: hostname.to_string(),
                step: PublishStep::Allocate,
                source,
            })?;

        Ok(RecordGroup {
            handle,
            hostname: hostname.to_string(),
            state: GroupState::Unpublished,
            committed_at: None,
        })
    }

    /// Add the CNAME record pointing the group's hostname at `target`.
    pub async fn populate(
        &self,
        group: &mut RecordGroup<R::Group>,
        target: &str,
    ) -> Result<(), AliasError> {
        group.require(PublishStep::Populate, &[GroupState::Unpublished])?;

        let record = AliasRecord::cname(&group.hostname, fqdn::encode(target)?);
        self.responder
            .add_record(&group.handle, &record)
            .await
            .map_err(|e| group.failed(PublishStep::Populate, e))?;

        group.state = GroupState::Populated;
        Ok(())
    }

    /// Make the populated records live on the network.
    pub async fn commit(&self, group: &mut RecordGroup<R::Group>) -> Result<(), AliasError> {
        group.require(PublishStep::Commit, &[GroupState::Populated])?;

        self.responder
            .commit(&group.handle)
            .await
            .map_err(|e| group.failed(PublishStep::Commit, e))?;

        group.state = GroupState::Committed;
        group.committed_at = Some(Utc::now());
        Ok(())
    }

    /// Withdraw all records from the group.
    pub async fn reset(&self, group: &mut RecordGroup<R::Group>) -> Result<(), AliasError> {
        group.require(
            PublishStep::Reset,
            &[GroupState::Populated, GroupState::Committed],
        )?;

        self.responder
            .reset(&group.handle)
            .await
            .map_err(|e| group.failed(PublishStep::Reset, e))?;

        group.state = GroupState::Resetting;
        Ok(())
    }

    /// Free the group on the responder side.
    pub async fn release(&self, group: &mut RecordGroup<R::Group>) -> Result<(), AliasError> {
        group.require(
            PublishStep::Release,
            &[
                GroupState::Unpublished,
                GroupState::Populated,
                GroupState::Committed,
                GroupState::Resetting,
            ],
        )?;

        self.responder
            .free(&group.handle)
            .await
            .map_err(|e| group.failed(PublishStep::Release, e))?;

        group.state = GroupState::Released;
        Ok(())
    }

    /// Allocate, populate and commit an alias. A group that fails part way
    /// is released before the error is returned.
    pub async fn add_alias(
        &self,
        hostname: &str,
        target: &str,
    ) -> Result<RecordGroup<R::Group>, AliasError> {
        let mut group = self.allocate(hostname).await?;

        let published = match self.populate(&mut group, target).await {
            Ok(()) => self.commit(&mut group).await,
            Err(e) => Err(e),
        };

        if let Err(e) = published {
            if let Err(release_err) = self.release(&mut group).await {
                tracing::warn!("Failed to release group for {}: {}", hostname, release_err);
            }
            return Err(e);
        }

        tracing::debug!("Committed alias {} -> {}", hostname, target);
        Ok(group)
    }

    /// Reset and release an alias. A group whose reset already succeeded is
    /// only released, so a failed delete can be retried.
    pub async fn delete_alias(&self, group: &mut RecordGroup<R::Group>) -> Result<(), AliasError> {
        if matches!(group.state, GroupState::Populated | GroupState::Committed) {
            self.reset(group).await?;
        }
        self.release(group).await?;

        tracing::debug!("Released alias {}", group.hostname);
        Ok(())
    }
}
