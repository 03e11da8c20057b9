// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Building and fanning out Hello/Bye announcements.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::binding::OutgoingDiscoveryInfo;
use crate::comm::CommunicationManager;

use super::data::DiscoveryData;
use super::message::{ByeMessage, HelloMessage};
use super::sequence::SequenceCounter;

/// Builds announcement messages from discovery data and transmits them
/// across every supported protocol version and usable target.
///
/// Sending is best-effort: per-target transport failures are logged and
/// never abort the fan-out.
pub struct AnnouncementDispatcher {
    comm: Arc<dyn CommunicationManager>,
    sequence: Arc<SequenceCounter>,
    max_hello_types: usize,
    /// Serializes stamping and transmission, so messages leave in
    /// sequence order even when commits race on different threads.
    send_gate: Mutex<()>,
}

impl AnnouncementDispatcher {
    /// Create a dispatcher.
    pub fn new(
        comm: Arc<dyn CommunicationManager>,
        sequence: Arc<SequenceCounter>,
        max_hello_types: usize,
    ) -> Self {
        Self {
            comm,
            sequence,
            max_hello_types,
            send_gate: Mutex::new(()),
        }
    }

    /// The sequence counter announcements are stamped from.
    pub fn sequence(&self) -> &SequenceCounter {
        &self.sequence
    }

    /// Build a Hello from a discovery data snapshot.
    ///
    /// The type set is truncated to the highest-priority entries within
    /// the envelope cap; overflow types are dropped, not wrapped.
    pub fn build_hello(&self, data: Arc<DiscoveryData>) -> HelloMessage {
        let mut ranked: Vec<(i32, &str)> = data
            .types
            .iter()
            .map(|t| (t.priority, t.name.as_str()))
            .collect();
        ranked.sort_by(|a, b| b.0.cmp(&a.0));
        if ranked.len() > self.max_hello_types {
            log::debug!(
                "[Announce] dropping {} low-priority types from Hello",
                ranked.len() - self.max_hello_types
            );
            ranked.truncate(self.max_hello_types);
        }
        let types = ranked.into_iter().map(|(_, name)| name.to_string()).collect();

        HelloMessage {
            data,
            types,
            sequence: self.sequence.next(),
        }
    }

    /// Build a Bye from a discovery data snapshot.
    pub fn build_bye(&self, data: Arc<DiscoveryData>) -> ByeMessage {
        ByeMessage {
            data,
            sequence: self.sequence.next(),
        }
    }

    /// Send one Hello per supported protocol version to every usable
    /// target. An empty target set is a quiet no-op.
    pub fn send_hello(&self, hello: &HelloMessage, targets: &[OutgoingDiscoveryInfo]) {
        let usable: Vec<&OutgoingDiscoveryInfo> = targets.iter().filter(|t| t.usable).collect();
        if usable.is_empty() {
            log::info!(
                "[Announce] Hello for {} suppressed: no usable targets",
                hello.endpoint_reference()
            );
            return;
        }
        for version in self.comm.supported_versions() {
            for target in &usable {
                if let Err(e) = self.comm.send_hello(version, hello, target) {
                    log::warn!(
                        "[Announce] Hello ({}) to {} failed: {}",
                        version,
                        target.key,
                        e
                    );
                }
            }
        }
    }

    /// Send one Bye per supported protocol version to every usable
    /// target. An empty target set is a quiet no-op.
    pub fn send_bye(&self, bye: &ByeMessage, targets: &[OutgoingDiscoveryInfo]) {
        let usable: Vec<&OutgoingDiscoveryInfo> = targets.iter().filter(|t| t.usable).collect();
        if usable.is_empty() {
            log::info!(
                "[Announce] Bye for {} suppressed: no usable targets",
                bye.endpoint_reference()
            );
            return;
        }
        for version in self.comm.supported_versions() {
            for target in &usable {
                if let Err(e) = self.comm.send_bye(version, bye, target) {
                    log::warn!(
                        "[Announce] Bye ({}) to {} failed: {}",
                        version,
                        target.key,
                        e
                    );
                }
            }
        }
    }

    /// Build and send a Hello in one step.
    ///
    /// The whole stamp+send runs under the send gate: a Hello stamped
    /// earlier can never reach the wire after one stamped later.
    pub fn announce_hello(&self, data: Arc<DiscoveryData>, targets: &[OutgoingDiscoveryInfo]) {
        let _gate = self.send_gate.lock();
        let hello = self.build_hello(data);
        self.send_hello(&hello, targets);
    }

    /// Build and send a Bye in one step, under the send gate.
    pub fn announce_bye(&self, data: Arc<DiscoveryData>, targets: &[OutgoingDiscoveryInfo]) {
        let _gate = self.send_gate.lock();
        let bye = self.build_bye(data);
        self.send_bye(&bye, targets);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::announce::data::QualifiedType;
    use crate::binding::{BindingKey, CommunicationBinding, DiscoveryBinding};
    use crate::comm::ProtocolVersion;
    use crate::net::AddressFamily;
    use crate::{Error, Result};
    use parking_lot::Mutex;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    use super::super::sequence::AppSequence;

    #[derive(Default)]
    struct RecordingComm {
        hellos: Mutex<Vec<(ProtocolVersion, BindingKey)>>,
        hello_sequences: Mutex<Vec<AppSequence>>,
        byes: Mutex<Vec<(ProtocolVersion, BindingKey)>>,
        fail_sends: bool,
    }

    impl CommunicationManager for RecordingComm {
        fn register_binding(&self, _binding: &CommunicationBinding) -> Result<()> {
            Ok(())
        }

        fn unregister_binding(&self, _binding: &CommunicationBinding) -> Result<()> {
            Ok(())
        }

        fn register_discovery(&self, _binding: &DiscoveryBinding) -> Result<()> {
            Ok(())
        }

        fn unregister_discovery(&self, _binding: &DiscoveryBinding) -> Result<()> {
            Ok(())
        }

        fn derive_discovery_bindings(
            &self,
            _binding: &CommunicationBinding,
        ) -> Vec<DiscoveryBinding> {
            Vec::new()
        }

        fn derive_outgoing_infos(
            &self,
            _binding: &CommunicationBinding,
            _include_xaddrs: bool,
            _credential_id: Option<u64>,
        ) -> Vec<OutgoingDiscoveryInfo> {
            Vec::new()
        }

        fn supported_versions(&self) -> Vec<ProtocolVersion> {
            vec![ProtocolVersion::Dpws2006, ProtocolVersion::Dpws11]
        }

        fn send_hello(
            &self,
            version: ProtocolVersion,
            hello: &HelloMessage,
            target: &OutgoingDiscoveryInfo,
        ) -> Result<()> {
            if self.fail_sends {
                return Err(Error::Io("send failed".to_string()));
            }
            self.hellos.lock().push((version, target.key.clone()));
            self.hello_sequences.lock().push(hello.sequence);
            Ok(())
        }

        fn send_bye(
            &self,
            version: ProtocolVersion,
            _bye: &ByeMessage,
            target: &OutgoingDiscoveryInfo,
        ) -> Result<()> {
            self.byes.lock().push((version, target.key.clone()));
            Ok(())
        }
    }

    fn info(last: u8, usable: bool) -> OutgoingDiscoveryInfo {
        let target = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(239, 255, 255, 250)), 3702);
        OutgoingDiscoveryInfo {
            key: BindingKey::outgoing(&format!("eth{}", last), &target),
            interface: format!("eth{}", last),
            family: AddressFamily::Ipv4,
            target,
            usable,
            proxies: Vec::new(),
        }
    }

    fn data_with_types(count: usize) -> Arc<DiscoveryData> {
        Arc::new(DiscoveryData {
            endpoint_reference: "urn:uuid:1234".to_string(),
            types: (0..count)
                .map(|i| QualifiedType::new(format!("t{}", i)).with_priority(i as i32))
                .collect(),
            scopes: Vec::new(),
            xaddrs: Vec::new(),
            metadata_version: 1,
        })
    }

    fn dispatcher(comm: Arc<RecordingComm>) -> AnnouncementDispatcher {
        AnnouncementDispatcher::new(comm, Arc::new(SequenceCounter::new()), 5)
    }

    #[test]
    fn test_build_hello_truncates_by_priority() {
        let dispatcher = dispatcher(Arc::new(RecordingComm::default()));
        let hello = dispatcher.build_hello(data_with_types(8));

        assert_eq!(hello.types.len(), 5);
        // Highest priorities survive, descending
        assert_eq!(hello.types[0], "t7");
        assert_eq!(hello.types[4], "t3");
    }

    #[test]
    fn test_build_hello_keeps_small_type_sets() {
        let dispatcher = dispatcher(Arc::new(RecordingComm::default()));
        let hello = dispatcher.build_hello(data_with_types(3));
        assert_eq!(hello.types.len(), 3);
    }

    #[test]
    fn test_send_hello_per_version_per_target() {
        let comm = Arc::new(RecordingComm::default());
        let dispatcher = dispatcher(Arc::clone(&comm));

        let hello = dispatcher.build_hello(data_with_types(1));
        dispatcher.send_hello(&hello, &[info(0, true), info(1, true)]);

        // 2 versions x 2 targets
        assert_eq!(comm.hellos.lock().len(), 4);
    }

    #[test]
    fn test_send_hello_skips_unusable_targets() {
        let comm = Arc::new(RecordingComm::default());
        let dispatcher = dispatcher(Arc::clone(&comm));

        let hello = dispatcher.build_hello(data_with_types(1));
        dispatcher.send_hello(&hello, &[info(0, true), info(1, false)]);

        assert_eq!(comm.hellos.lock().len(), 2);
    }

    #[test]
    fn test_send_hello_empty_targets_is_noop() {
        let comm = Arc::new(RecordingComm::default());
        let dispatcher = dispatcher(Arc::clone(&comm));

        let hello = dispatcher.build_hello(data_with_types(1));
        dispatcher.send_hello(&hello, &[]);

        assert!(comm.hellos.lock().is_empty());
    }

    #[test]
    fn test_send_failures_do_not_abort_fanout() {
        let comm = Arc::new(RecordingComm {
            fail_sends: true,
            ..Default::default()
        });
        let dispatcher = dispatcher(Arc::clone(&comm));

        let hello = dispatcher.build_hello(data_with_types(1));
        dispatcher.send_hello(&hello, &[info(0, true)]);
        // Nothing recorded, but no panic either
        assert!(comm.hellos.lock().is_empty());
    }

    #[test]
    fn test_racing_announces_reach_wire_in_stamp_order() {
        let comm = Arc::new(RecordingComm::default());
        let dispatcher = Arc::new(dispatcher(Arc::clone(&comm)));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let dispatcher = Arc::clone(&dispatcher);
            handles.push(std::thread::spawn(move || {
                for _ in 0..25 {
                    dispatcher.announce_hello(data_with_types(1), &[info(0, true)]);
                }
            }));
        }
        for handle in handles {
            handle.join().expect("thread should not panic");
        }

        let sequences = comm.hello_sequences.lock();
        // 2 versions x 100 announces
        assert_eq!(sequences.len(), 200);
        for pair in sequences.windows(2) {
            assert!(
                pair[1] >= pair[0],
                "stamped {:?} transmitted after {:?}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_bye_carries_no_types_and_advances_sequence() {
        let comm = Arc::new(RecordingComm::default());
        let dispatcher = dispatcher(Arc::clone(&comm));

        let hello = dispatcher.build_hello(data_with_types(2));
        let bye = dispatcher.build_bye(data_with_types(2));

        assert!(bye.sequence > hello.sequence);
        dispatcher.send_bye(&bye, &[info(0, true)]);
        assert_eq!(comm.byes.lock().len(), 2);
    }
}
