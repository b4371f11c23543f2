pub mod dbus;
#[cfg(test)]
pub mod fake;
pub mod fqdn;
pub mod publisher;
