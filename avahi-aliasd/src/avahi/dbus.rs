//! Avahi responder reached over the system D-Bus.

use async_trait::async_trait;
use shared::protocol::{AVAHI_SERVER_PATH, AVAHI_SERVICE};
use zbus::zvariant::OwnedObjectPath;
use zbus::Connection;

use crate::avahi::publisher::{AliasRecord, Responder};
use crate::error::ResponderError;

#[zbus::proxy(
    interface = "org.freedesktop.Avahi.Server",
    default_service = "org.freedesktop.Avahi",
    default_path = "/"
)]
trait Server {
    fn get_version_string(&self) -> zbus::Result<String>;

    fn entry_group_new(&self) -> zbus::Result<OwnedObjectPath>;
}

#[zbus::proxy(
    interface = "org.freedesktop.Avahi.EntryGroup",
    default_service = "org.freedesktop.Avahi"
)]
trait EntryGroup {
    #[allow(clippy::too_many_arguments)]
    fn add_record(
        &self,
        interface: i32,
        protocol: i32,
        flags: u32,
        name: &str,
        clazz: u16,
        rtype: u16,
        ttl: u32,
        rdata: &[u8],
    ) -> zbus::Result<()>;

    fn commit(&self) -> zbus::Result<()>;

    fn reset(&self) -> zbus::Result<()>;

    fn free(&self) -> zbus::Result<()>;
}

/// Avahi daemon client. The connection is shared by every record group.
pub struct AvahiResponder {
    connection: Connection,
    server: ServerProxy<'static>,
}

impl AvahiResponder {
    pub async fn connect(connection: Connection) -> zbus::Result<Self> {
        let server = ServerProxy::builder(&connection)
            .destination(AVAHI_SERVICE)?
            .path(AVAHI_SERVER_PATH)?
            .build()
            .await?;

        let version = server.get_version_string().await?;
        tracing::info!("Connected to {}", version);

        Ok(Self { connection, server })
    }
}

#[async_trait]
impl Responder for AvahiResponder {
    type Group = EntryGroupProxy<'static>;

    async fn entry_group_new(&self) -> Result<Self::Group, ResponderError> {
        let path = self.server.entry_group_new().await?;
        let group = EntryGroupProxy::builder(&self.connection)
            .destination(AVAHI_SERVICE)?
            .path(path.into_inner())?
            .build()
            .await?;
        Ok(group)
    }

    async fn add_record(&self, group: &Self::Group, record: &AliasRecord) -> Result<(), ResponderError> {
        group
            .add_record(
                record.interface,
                record.protocol,
                record.flags,
                &record.name,
                record.class,
                record.rtype,
                record.ttl,
                &record.rdata,
            )
            .await?;
        Ok(())
    }

    async fn commit(&self, group: &Self::Group) -> Result<(), ResponderError> {
        group.commit().await?;
        Ok(())
    }

    async fn reset(&self, group: &Self::Group) -> Result<(), ResponderError> {
        group.reset().await?;
        Ok(())
    }

    async fn free(&self, group: &Self::Group) -> Result<(), ResponderError> {
        group.free().await?;
        Ok(())
    }
}
