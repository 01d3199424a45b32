use std::collections::BTreeMap;

use block::{CompactBlock, Cons, CpBlock, TxBlock};
use consensus::{AcsMessage, BrachaMessage, Mo14Message};
use primitives::{NodeId, Round, SeqNum};
use serde::{Deserialize, Serialize};
use trust_core::Signature;

use crate::instruction::Instruction;
use crate::{CodecError, Result};

/// Fixed, versioned tag enumeration. One `u16` tag precedes every wire
/// frame; the body is the `bincode` encoding of the variant payload.
pub mod tags {
    pub const PING: u16 = 0;
    pub const PONG: u16 = 1;
    pub const DUMMY: u16 = 2;
    pub const BRACHA: u16 = 3;
    pub const MO14: u16 = 4;
    pub const ACS: u16 = 5;
    pub const TX_REQ: u16 = 6;
    pub const TX_RESP: u16 = 7;
    pub const VALIDATION_REQ: u16 = 8;
    pub const VALIDATION_RESP: u16 = 9;
    pub const CP_BLOCK: u16 = 10;
    pub const SIG_WITH_ROUND: u16 = 11;
    pub const CONS: u16 = 12;
    pub const ASK_CONS: u16 = 13;
    pub const INSTRUCTION: u16 = 14;
    pub const DISCOVER: u16 = 15;
    pub const DISCOVER_REPLY: u16 = 16;
}

/// Every message a node sends or receives, one variant per wire tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    Ping { vk: NodeId, port: u16 },
    Pong { vk: NodeId, port: u16 },
    Dummy { m: Vec<u8> },

    /// A standalone reliable-broadcast instance (testing aid; consensus
    /// traffic normally travels inside `Acs`).
    Bracha(BrachaMessage),
    /// A standalone binary-agreement instance (testing aid).
    Mo14(Mo14Message),
    Acs(AcsMessage),

    TxReq { tx: TxBlock },
    TxResp { seq: SeqNum, tx: TxBlock },
    ValidationReq { seq: SeqNum, seq_counterparty: SeqNum },
    ValidationResp {
        seq: SeqNum,
        seq_counterparty: SeqNum,
        pieces: Vec<CompactBlock>,
    },

    Cp { cp: CpBlock },
    SigWithRound { s: Signature, r: Round },
    Cons { cons: Cons },
    AskCons { r: Round },

    Instruction(Instruction),
    Discover { vk: NodeId, addr: String },
    DiscoverReply { nodes: BTreeMap<NodeId, String> },
}

impl Message {
    pub fn tag(&self) -> u16 {
        match self {
            Message::Ping { .. } => tags::PING,
            Message::Pong { .. } => tags::PONG,
            Message::Dummy { .. } => tags::DUMMY,
            Message::Bracha(_) => tags::BRACHA,
            Message::Mo14(_) => tags::MO14,
            Message::Acs(_) => tags::ACS,
            Message::TxReq { .. } => tags::TX_REQ,
            Message::TxResp { .. } => tags::TX_RESP,
            Message::ValidationReq { .. } => tags::VALIDATION_REQ,
            Message::ValidationResp { .. } => tags::VALIDATION_RESP,
            Message::Cp { .. } => tags::CP_BLOCK,
            Message::SigWithRound { .. } => tags::SIG_WITH_ROUND,
            Message::Cons { .. } => tags::CONS,
            Message::AskCons { .. } => tags::ASK_CONS,
            Message::Instruction(_) => tags::INSTRUCTION,
            Message::Discover { .. } => tags::DISCOVER,
            Message::DiscoverReply { .. } => tags::DISCOVER_REPLY,
        }
    }

    /// Short name for log lines and traffic stats.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Ping { .. } => "ping",
            Message::Pong { .. } => "pong",
            Message::Dummy { .. } => "dummy",
            Message::Bracha(_) => "bracha",
            Message::Mo14(_) => "mo14",
            Message::Acs(_) => "acs",
            Message::TxReq { .. } => "tx_req",
            Message::TxResp { .. } => "tx_resp",
            Message::ValidationReq { .. } => "validation_req",
            Message::ValidationResp { .. } => "validation_resp",
            Message::Cp { .. } => "cp",
            Message::SigWithRound { .. } => "sig",
            Message::Cons { .. } => "cons",
            Message::AskCons { .. } => "ask_cons",
            Message::Instruction(_) => "instruction",
            Message::Discover { .. } => "discover",
            Message::DiscoverReply { .. } => "discover_reply",
        }
    }

    /// One tag-prefixed frame: `u16` big-endian tag, then the body.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let body = match self {
            Message::Ping { vk, port } => bincode::serialize(&(vk, port))?,
            Message::Pong { vk, port } => bincode::serialize(&(vk, port))?,
            Message::Dummy { m } => bincode::serialize(m)?,
            Message::Bracha(body) => bincode::serialize(body)?,
            Message::Mo14(body) => bincode::serialize(body)?,
            Message::Acs(body) => bincode::serialize(body)?,
            Message::TxReq { tx } => bincode::serialize(tx)?,
            Message::TxResp { seq, tx } => bincode::serialize(&(seq, tx))?,
            Message::ValidationReq {
                seq,
                seq_counterparty,
            } => bincode::serialize(&(seq, seq_counterparty))?,
            Message::ValidationResp {
                seq,
                seq_counterparty,
                pieces,
            } => bincode::serialize(&(seq, seq_counterparty, pieces))?,
            Message::Cp { cp } => bincode::serialize(cp)?,
            Message::SigWithRound { s, r } => bincode::serialize(&(s, r))?,
            Message::Cons { cons } => bincode::serialize(cons)?,
            Message::AskCons { r } => bincode::serialize(r)?,
            Message::Instruction(instruction) => bincode::serialize(instruction)?,
            Message::Discover { vk, addr } => bincode::serialize(&(vk, addr))?,
            Message::DiscoverReply { nodes } => bincode::serialize(nodes)?,
        };

        let mut frame = Vec::with_capacity(2 + body.len());
        frame.extend_from_slice(&self.tag().to_be_bytes());
        frame.extend_from_slice(&body);
        Ok(frame)
    }

    pub fn decode(frame: &[u8]) -> Result<Self> {
        if frame.len() < 2 {
            return Err(CodecError::Truncated);
        }
        let tag = u16::from_be_bytes([frame[0], frame[1]]);
        let body = &frame[2..];

        let msg = match tag {
            tags::PING => {
                let (vk, port) = bincode::deserialize(body)?;
                Message::Ping { vk, port }
            }
            tags::PONG => {
                let (vk, port) = bincode::deserialize(body)?;
                Message::Pong { vk, port }
            }
            tags::DUMMY => Message::Dummy {
                m: bincode::deserialize(body)?,
            },
            tags::BRACHA => Message::Bracha(bincode::deserialize(body)?),
            tags::MO14 => Message::Mo14(bincode::deserialize(body)?),
            tags::ACS => Message::Acs(bincode::deserialize(body)?),
            tags::TX_REQ => Message::TxReq {
                tx: bincode::deserialize(body)?,
            },
            tags::TX_RESP => {
                let (seq, tx) = bincode::deserialize(body)?;
                Message::TxResp { seq, tx }
            }
            tags::VALIDATION_REQ => {
                let (seq, seq_counterparty) = bincode::deserialize(body)?;
                Message::ValidationReq {
                    seq,
                    seq_counterparty,
                }
            }
            tags::VALIDATION_RESP => {
                let (seq, seq_counterparty, pieces) = bincode::deserialize(body)?;
                Message::ValidationResp {
                    seq,
                    seq_counterparty,
                    pieces,
                }
            }
            tags::CP_BLOCK => Message::Cp {
                cp: bincode::deserialize(body)?,
            },
            tags::SIG_WITH_ROUND => {
                let (s, r) = bincode::deserialize(body)?;
                Message::SigWithRound { s, r }
            }
            tags::CONS => Message::Cons {
                cons: bincode::deserialize(body)?,
            },
            tags::ASK_CONS => Message::AskCons {
                r: bincode::deserialize(body)?,
            },
            tags::INSTRUCTION => Message::Instruction(bincode::deserialize(body)?),
            tags::DISCOVER => {
                let (vk, addr) = bincode::deserialize(body)?;
                Message::Discover { vk, addr }
            }
            tags::DISCOVER_REPLY => Message::DiscoverReply {
                nodes: bincode::deserialize(body)?,
            },
            unknown => return Err(CodecError::UnknownTag(unknown)),
        };
        Ok(msg)
    }

    /// Wire size of this message, used by the traffic stats.
    pub fn encoded_len(&self) -> usize {
        self.encode().map(|f| f.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use block::{generate_genesis_block, TxBlock};
    use primitives::{random_nonce, Digest};
    use trust_core::Keypair;

    fn sample_messages() -> Vec<Message> {
        let keypair = Keypair::random();
        let vk = keypair.node_id();
        let counterparty = Keypair::random().node_id();
        let genesis = generate_genesis_block(&keypair);

        let tx = TxBlock::new(
            &keypair,
            genesis.hash(),
            1,
            counterparty,
            random_nonce(),
            b"ping".to_vec(),
        );

        vec![
            Message::Ping { vk, port: 8000 },
            Message::Pong { vk, port: 8001 },
            Message::Dummy { m: b"z".to_vec() },
            Message::Bracha(BrachaMessage::Ready {
                root: Digest::sha256(b"root"),
            }),
            Message::Mo14(Mo14Message::Est { r: 2, v: true }),
            Message::Acs(AcsMessage {
                instance: vk,
                round: 3,
                body: consensus::AcsBody::Mo14(Mo14Message::Aux { r: 1, v: false }),
            }),
            Message::TxReq { tx: tx.clone() },
            Message::TxResp { seq: 4, tx },
            Message::ValidationReq {
                seq: 5,
                seq_counterparty: 6,
            },
            Message::ValidationResp {
                seq: 5,
                seq_counterparty: 6,
                pieces: vec![CompactBlock {
                    digest: Digest::sha256(b"d"),
                    prev: Digest::sha256(b"p"),
                    seq: 6,
                    agreed_round: Some(2),
                }],
            },
            Message::Cp {
                cp: genesis.clone(),
            },
            Message::SigWithRound {
                s: keypair.sign_digest(&Digest::sha256(b"cons")),
                r: 1,
            },
            Message::Cons {
                cons: Cons::new(1, vec![genesis]),
            },
            Message::AskCons { r: 7 },
            Message::Instruction(Instruction {
                delay_ms: 500,
                kind: crate::InstructionKind::TxValidate,
                param: Some(1000),
            }),
            Message::Discover {
                vk,
                addr: "127.0.0.1:8000".to_string(),
            },
            Message::DiscoverReply {
                nodes: BTreeMap::from([(vk, "127.0.0.1:8000".to_string())]),
            },
        ]
    }

    #[test]
    fn every_variant_round_trips() {
        for msg in sample_messages() {
            let frame = msg.encode().unwrap();
            let decoded = Message::decode(&frame).unwrap();
            assert_eq!(decoded, msg, "variant {}", msg.kind());
            assert_eq!(decoded.tag(), msg.tag());
        }
    }

    #[test]
    fn tx_block_local_state_stays_off_the_wire() {
        let keypair = Keypair::random();
        let other = Keypair::random();
        let nonce = random_nonce();

        let mut tx = TxBlock::new(
            &keypair,
            Digest::sha256(b"prev"),
            1,
            other.node_id(),
            nonce,
            b"m".to_vec(),
        );
        let half = TxBlock::new(
            &other,
            Digest::sha256(b"prev-b"),
            1,
            keypair.node_id(),
            nonce,
            b"m".to_vec(),
        );
        tx.add_other_half(&keypair.node_id(), half).unwrap();

        let frame = Message::TxReq { tx: tx.clone() }.encode().unwrap();
        let decoded = Message::decode(&frame).unwrap();
        let Message::TxReq { tx: decoded_tx } = decoded else {
            panic!("wrong variant");
        };

        assert!(decoded_tx.other_half.is_none());
        // the digest covers only the signed content, so it survives
        assert_eq!(decoded_tx.hash(), tx.hash());
    }

    #[test]
    fn tag_values_are_pinned() {
        // the wire enumeration is versioned; these values must not drift
        let keypair = Keypair::random();
        let vk = keypair.node_id();
        assert_eq!(Message::Ping { vk, port: 0 }.tag(), 0);
        assert_eq!(Message::Acs(AcsMessage {
            instance: vk,
            round: 0,
            body: consensus::AcsBody::Mo14(Mo14Message::Est { r: 1, v: false }),
        })
        .tag(), 5);
        assert_eq!(Message::AskCons { r: 0 }.tag(), 13);
        assert_eq!(
            Message::DiscoverReply {
                nodes: BTreeMap::new()
            }
            .tag(),
            16
        );
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let frame = [0xff, 0xff, 0, 0];
        assert!(matches!(
            Message::decode(&frame),
            Err(CodecError::UnknownTag(0xffff))
        ));
    }

    #[test]
    fn truncated_frame_is_rejected() {
        assert!(matches!(Message::decode(&[3]), Err(CodecError::Truncated)));
    }

    #[test]
    fn digests_travel_as_raw_bytes() {
        let root = Digest::sha256(b"payload");
        let frame = Message::Bracha(BrachaMessage::Ready { root })
            .encode()
            .unwrap();
        // tag (2) + variant index (4) + digest (32)
        assert!(frame.windows(32).any(|w| w == root.as_bytes()));
    }
}
