//! User settings and emergency contact lists.
//!
//! Both live in durable cells under the data directory; the contact lists
//! are sealed because they identify real people. All writes go through the
//! cell's atomic read-modify-write so concurrent toggles never clobber
//! each other.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::crypto::KeyProvider;
use crate::paths::{DataDir, CONTACTS_FILE, SETTINGS_FILE};
use crate::store::{DurableCell, StoreError, Subscription};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

/// Singleton configuration cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub theme: Theme,
    pub notifications_enabled: bool,
    /// Haptic confirmation when a silent capture starts
    pub enable_vibration_on_start: bool,
    pub enable_sms_on_emergency: bool,
    pub enable_email_on_emergency: bool,
    pub upload_recording_to_drive_on_end: bool,
    /// Also message the routine check-in contact while an emergency runs
    pub enable_routine_contact_during_emergency: bool,
    pub tutorial_completed: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: Theme::System,
            notifications_enabled: true,
            enable_vibration_on_start: true,
            enable_sms_on_emergency: true,
            enable_email_on_emergency: false,
            upload_recording_to_drive_on_end: false,
            enable_routine_contact_during_emergency: false,
            tutorial_completed: false,
        }
    }
}

/// Trusted-contact lists: SMS numbers and email addresses, independently
/// mutable. Entries are kept exactly as entered - no dedup, no format
/// validation; the contact-editing screens own input hygiene.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmergencyContacts {
    pub sms_numbers: Vec<String>,
    pub email_addresses: Vec<String>,
}

impl EmergencyContacts {
    pub fn is_empty(&self) -> bool {
        self.sms_numbers.is_empty() && self.email_addresses.is_empty()
    }
}

/// Repository over the settings cell.
#[derive(Clone)]
pub struct SettingsRepository {
    cell: DurableCell<Settings>,
}

impl SettingsRepository {
    pub fn new(data_dir: &DataDir) -> Self {
        Self {
            cell: DurableCell::new(data_dir.cell(SETTINGS_FILE)),
        }
    }

    pub async fn read(&self) -> Settings {
        self.cell.read().await
    }

    pub async fn subscribe(&self) -> Subscription<Settings> {
        self.cell.subscribe().await
    }

    pub async fn update<F>(&self, f: F) -> Result<Settings, StoreError>
    where
        F: FnOnce(Settings) -> Settings,
    {
        self.cell.update(f).await
    }
}

/// Repository over the sealed contacts cell.
#[derive(Clone)]
pub struct ContactsRepository {
    cell: DurableCell<EmergencyContacts>,
}

impl ContactsRepository {
    pub fn new(data_dir: &DataDir, keys: Arc<dyn KeyProvider>) -> Self {
        Self {
            cell: DurableCell::encrypted(data_dir.cell(CONTACTS_FILE), keys),
        }
    }

    pub async fn read(&self) -> EmergencyContacts {
        self.cell.read().await
    }

    pub async fn subscribe(&self) -> Subscription<EmergencyContacts> {
        self.cell.subscribe().await
    }

    pub async fn add_sms_number(&self, number: String) -> Result<(), StoreError> {
        self.cell
            .update(|mut contacts| {
                contacts.sms_numbers.push(number);
                contacts
            })
            .await?;
        Ok(())
    }

    /// Removes the first occurrence; unknown numbers are a no-op.
    pub async fn remove_sms_number(&self, number: &str) -> Result<(), StoreError> {
        self.cell
            .update(|mut contacts| {
                if let Some(at) = contacts.sms_numbers.iter().position(|n| n == number) {
                    contacts.sms_numbers.remove(at);
                }
                contacts
            })
            .await?;
        Ok(())
    }

    pub async fn add_email_address(&self, address: String) -> Result<(), StoreError> {
        self.cell
            .update(|mut contacts| {
                contacts.email_addresses.push(address);
                contacts
            })
            .await?;
        Ok(())
    }

    /// Removes the first occurrence; unknown addresses are a no-op.
    pub async fn remove_email_address(&self, address: &str) -> Result<(), StoreError> {
        self.cell
            .update(|mut contacts| {
                if let Some(at) = contacts.email_addresses.iter().position(|a| a == address) {
                    contacts.email_addresses.remove(at);
                }
                contacts
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
