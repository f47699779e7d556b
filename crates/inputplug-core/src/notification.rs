//! Hierarchy notifications and their decoding
//!
//! A hierarchy notification carries one record per affected device. Each
//! record is split into its individual changes and every change is handed
//! to a [`Dispatch`] target, strictly in record order and then in
//! [`ChangeKind::ALL`](crate::names::ChangeKind::ALL) order within a record.

use crate::dispatch::{Dispatch, DispatchEvent};
use crate::flags::{self, ChangeFlags};
use crate::names::{ChangeKind, DeviceClass};

/// One device's entry in a hierarchy notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HierarchyRecord {
    pub device_id: u16,
    pub device_class: Option<DeviceClass>,
    pub flags: ChangeFlags,
    /// Present when the source already knows the name (bootstrap); live
    /// notifications leave it empty and rely on a [`DeviceNameLookup`].
    pub device_name: Option<String>,
}

impl HierarchyRecord {
    /// Build a record from raw protocol values
    pub fn from_raw(device_id: u16, class_code: u8, flags: u32) -> Self {
        Self {
            device_id,
            device_class: DeviceClass::from_code(class_code),
            flags: ChangeFlags::from_bits(flags),
            device_name: None,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = Some(name.into());
        self
    }

    /// Record describing an already present device, as if it had just
    /// appeared: masters are added, slaves are added and enabled.
    ///
    /// Returns `None` for devices without a known class.
    pub fn bootstrap(device_id: u16, class_code: u8, name: Option<String>) -> Option<Self> {
        let class = DeviceClass::from_code(class_code)?;
        let flags = if class.is_master() {
            ChangeFlags::from(ChangeKind::MasterAdded)
        } else {
            ChangeFlags::from(ChangeKind::SlaveAdded).with(ChangeKind::DeviceEnabled)
        };

        Some(Self {
            device_id,
            device_class: Some(class),
            flags,
            device_name: name,
        })
    }
}

/// An ordered batch of records delivered as one unit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Notification {
    pub records: Vec<HierarchyRecord>,
}

impl Notification {
    pub fn new(records: Vec<HierarchyRecord>) -> Self {
        Self { records }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<HierarchyRecord> for Notification {
    fn from_iter<I: IntoIterator<Item = HierarchyRecord>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Resolves a device id to its current name
///
/// Removed devices can no longer be queried; implementations return `None`
/// and the name is treated as unknown.
pub trait DeviceNameLookup {
    fn device_name(&self, device_id: u16) -> Option<String>;
}

/// Drives decoding and dispatch for whole notifications
#[derive(Debug)]
pub struct NotificationDecoder<D> {
    dispatcher: D,
}

impl<D: Dispatch> NotificationDecoder<D> {
    pub fn new(dispatcher: D) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut D {
        &mut self.dispatcher
    }

    pub fn into_dispatcher(self) -> D {
        self.dispatcher
    }

    /// Dispatch every change in `notification`
    ///
    /// Names missing from a record are looked up through `lookup` when one
    /// is given; a failed lookup leaves the name unknown.
    ///
    /// Returns the number of events dispatched.
    pub fn handle(
        &mut self,
        notification: Notification,
        lookup: Option<&dyn DeviceNameLookup>,
    ) -> usize {
        let mut dispatched = 0;

        for record in notification.records {
            if record.flags.is_empty() {
                continue;
            }

            let device_name = record
                .device_name
                .or_else(|| lookup.and_then(|l| l.device_name(record.device_id)));

            tracing::debug!(
                device_id = record.device_id,
                flags = record.flags.bits(),
                "Hierarchy change for device {:?}",
                device_name
            );

            for change in flags::decode(record.flags) {
                let event = DispatchEvent {
                    change,
                    device_id: record.device_id,
                    device_class: record.device_class,
                    device_name: device_name.clone(),
                };
                self.dispatcher.dispatch(&event);
                dispatched += 1;
            }
        }

        dispatched
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Recorder {
        events: Vec<DispatchEvent>,
    }

    impl Dispatch for Recorder {
        fn dispatch(&mut self, event: &DispatchEvent) {
            self.events.push(event.clone());
        }
    }

    #[derive(Default)]
    struct NameTable {
        names: HashMap<u16, String>,
        queries: Cell<usize>,
    }

    impl DeviceNameLookup for NameTable {
        fn device_name(&self, device_id: u16) -> Option<String> {
            self.queries.set(self.queries.get() + 1);
            self.names.get(&device_id).cloned()
        }
    }

    fn decoder() -> NotificationDecoder<Recorder> {
        NotificationDecoder::new(Recorder::default())
    }

    fn bits(kinds: &[ChangeKind]) -> u32 {
        kinds.iter().fold(0, |acc, k| acc | k.bit())
    }

    #[test]
    fn test_master_added_without_name() {
        let mut decoder = decoder();
        let record = HierarchyRecord::from_raw(
            5,
            DeviceClass::MasterKeyboard.code(),
            ChangeKind::MasterAdded.bit(),
        );

        let count = decoder.handle(Notification::new(vec![record]), None);

        assert_eq!(count, 1);
        let events = &decoder.dispatcher().events;
        assert_eq!(
            events[0],
            DispatchEvent {
                change: ChangeKind::MasterAdded,
                device_id: 5,
                device_class: Some(DeviceClass::MasterKeyboard),
                device_name: None,
            }
        );
    }

    #[test]
    fn test_slave_added_and_enabled_with_looked_up_name() {
        let mut decoder = decoder();
        let mut table = NameTable::default();
        table.names.insert(12, "Logitech Keyboard".to_string());

        let record = HierarchyRecord::from_raw(
            12,
            DeviceClass::SlaveKeyboard.code(),
            bits(&[ChangeKind::DeviceEnabled, ChangeKind::SlaveAdded]),
        );
        decoder.handle(Notification::new(vec![record]), Some(&table));

        let events = &decoder.dispatcher().events;
        let changes: Vec<_> = events.iter().map(|e| e.change).collect();
        assert_eq!(changes, vec![ChangeKind::SlaveAdded, ChangeKind::DeviceEnabled]);
        assert!(events
            .iter()
            .all(|e| e.device_name.as_deref() == Some("Logitech Keyboard")));
        // One lookup per record, not per change
        assert_eq!(table.queries.get(), 1);
    }

    #[test]
    fn test_zero_flags_dispatch_nothing() {
        let mut decoder = decoder();
        let table = NameTable::default();
        let record = HierarchyRecord::from_raw(7, DeviceClass::SlavePointer.code(), 0);

        assert_eq!(decoder.handle(Notification::new(vec![record]), Some(&table)), 0);
        assert!(decoder.dispatcher().events.is_empty());
        assert_eq!(table.queries.get(), 0);
    }

    #[test]
    fn test_record_then_bit_order() {
        let mut decoder = decoder();
        let notification = Notification::new(vec![
            HierarchyRecord::from_raw(
                10,
                DeviceClass::SlavePointer.code(),
                bits(&[ChangeKind::DeviceDisabled, ChangeKind::SlaveDetached]),
            ),
            HierarchyRecord::from_raw(
                11,
                DeviceClass::FloatingSlave.code(),
                bits(&[ChangeKind::SlaveRemoved]),
            ),
            HierarchyRecord::from_raw(
                3,
                DeviceClass::MasterPointer.code(),
                bits(&[ChangeKind::MasterRemoved, ChangeKind::MasterAdded]),
            ),
        ]);

        assert_eq!(decoder.handle(notification, None), 5);

        let order: Vec<_> = decoder
            .dispatcher()
            .events
            .iter()
            .map(|e| (e.device_id, e.change))
            .collect();
        assert_eq!(
            order,
            vec![
                (10, ChangeKind::SlaveDetached),
                (10, ChangeKind::DeviceDisabled),
                (11, ChangeKind::SlaveRemoved),
                (3, ChangeKind::MasterAdded),
                (3, ChangeKind::MasterRemoved),
            ]
        );
    }

    #[test]
    fn test_event_count_matches_set_bits() {
        let mut decoder = decoder();
        let flag_sets = [0x01u32, 0x44, 0xff, 0x30, 0x80];
        let notification: Notification = flag_sets
            .iter()
            .enumerate()
            .map(|(i, flags)| {
                HierarchyRecord::from_raw(i as u16, DeviceClass::SlaveKeyboard.code(), *flags)
            })
            .collect();

        let expected: u32 = flag_sets.iter().map(|f| f.count_ones()).sum();
        assert_eq!(decoder.handle(notification, None), expected as usize);
    }

    #[test]
    fn test_unknown_bits_and_class_do_not_abort() {
        let mut decoder = decoder();
        let record = HierarchyRecord::from_raw(
            4,
            42,
            0xff00 | ChangeKind::SlaveAttached.bit(),
        );
        assert_eq!(decoder.handle(Notification::new(vec![record]), None), 1);

        let event = &decoder.dispatcher().events[0];
        assert_eq!(event.change, ChangeKind::SlaveAttached);
        assert_eq!(event.device_class, None);
    }

    #[test]
    fn test_record_name_takes_precedence_over_lookup() {
        let mut decoder = decoder();
        let mut table = NameTable::default();
        table.names.insert(8, "Stale Name".to_string());

        let record = HierarchyRecord::from_raw(
            8,
            DeviceClass::SlavePointer.code(),
            ChangeKind::SlaveAdded.bit(),
        )
        .with_name("Fresh Name");
        decoder.handle(Notification::new(vec![record]), Some(&table));

        assert_eq!(
            decoder.dispatcher().events[0].device_name.as_deref(),
            Some("Fresh Name")
        );
        assert_eq!(table.queries.get(), 0);
    }

    #[test]
    fn test_failed_lookup_leaves_name_unknown() {
        let mut decoder = decoder();
        let table = NameTable::default();
        let record = HierarchyRecord::from_raw(
            15,
            DeviceClass::SlaveKeyboard.code(),
            ChangeKind::SlaveRemoved.bit(),
        );
        decoder.handle(Notification::new(vec![record]), Some(&table));

        assert_eq!(decoder.dispatcher().events[0].device_name, None);
        assert_eq!(table.queries.get(), 1);
    }

    #[test]
    fn test_bootstrap_records() {
        let master = HierarchyRecord::bootstrap(2, 2, Some("Virtual core keyboard".into()))
            .unwrap();
        assert_eq!(master.flags, ChangeFlags::from(ChangeKind::MasterAdded));

        let slave = HierarchyRecord::bootstrap(9, 5, None).unwrap();
        let kinds: Vec<_> = flags::decode(slave.flags).collect();
        assert_eq!(kinds, vec![ChangeKind::SlaveAdded, ChangeKind::DeviceEnabled]);

        assert!(HierarchyRecord::bootstrap(1, 0, None).is_none());
    }
}
