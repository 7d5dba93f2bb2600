//! Address allocation and event log shared by the bundled backends.

use crate::interfaces::{CallArg, LedgerEvent};
use crate::types::Address;

#[derive(Debug, Clone)]
pub(crate) struct Journal {
    prefix: u8,
    next_seq: u64,
    next_address: u64,
    events: Vec<LedgerEvent>,
}

impl Journal {
    pub(crate) fn new(prefix: u8) -> Self {
        Self {
            prefix,
            next_seq: 1,
            next_address: 1,
            events: Vec::new(),
        }
    }

    /// Fresh address: prefix byte, zero padding, big-endian counter.
    pub(crate) fn allocate(&mut self) -> Address {
        let mut bytes = [0u8; 20];
        bytes[0] = self.prefix;
        bytes[12..].copy_from_slice(&self.next_address.to_be_bytes());
        self.next_address += 1;
        Address::new(bytes)
    }

    fn seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    pub(crate) fn construct(&mut self, artifact: &str, address: Address, args: &[CallArg]) {
        let seq = self.seq();
        self.events.push(LedgerEvent::Construct {
            seq,
            artifact: artifact.to_string(),
            address,
            args: args.to_vec(),
        });
    }

    pub(crate) fn invoke(
        &mut self,
        sender: Option<Address>,
        target: Address,
        method: &str,
        args: &[CallArg],
    ) {
        let seq = self.seq();
        self.events.push(LedgerEvent::Invoke {
            seq,
            sender,
            target,
            method: method.to_string(),
            args: args.to_vec(),
        });
    }

    pub(crate) fn register(&mut self, artifact: &str, address: Address) {
        let seq = self.seq();
        self.events.push(LedgerEvent::Register {
            seq,
            artifact: artifact.to_string(),
            address,
        });
    }

    pub(crate) fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    pub(crate) fn into_events(self) -> Vec<LedgerEvent> {
        self.events
    }

    /// Arguments of the latest `method` call recorded against `target`.
    pub(crate) fn last_call(&self, target: Address, method: &str) -> Option<Vec<CallArg>> {
        self.events.iter().rev().find_map(|event| match event {
            LedgerEvent::Invoke {
                target: t,
                method: m,
                args,
                ..
            } if *t == target && m == method => Some(args.clone()),
            _ => None,
        })
    }
}
