use arbitrary::Arbitrary;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// Defines a newtype wrapper around `Vec<u8>` that serializes as hex in human readable formats.
macro_rules! define_byte_wrapper {
    ($name:ident) => {
        #[derive(
            Debug,
            Clone,
            Serialize,
            Deserialize,
            BorshSerialize,
            BorshDeserialize,
            PartialEq,
            Eq,
            Hash,
            Arbitrary,
            Default,
        )]
        pub struct $name(#[serde(with = "hex::serde")] Vec<u8>);

        impl $name {
            pub fn new(data: Vec<u8>) -> Self {
                Self(data)
            }

            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }

            pub fn into_inner(self) -> Vec<u8> {
                self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl From<Vec<u8>> for $name {
            fn from(value: Vec<u8>) -> Self {
                Self(value)
            }
        }

        impl From<&[u8]> for $name {
            fn from(value: &[u8]) -> Self {
                Self(value.to_vec())
            }
        }

        impl From<$name> for Vec<u8> {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

define_byte_wrapper!(Proof);
define_byte_wrapper!(PublicInputs);

/// Output of a single proving job: the proof plus the public inputs it attests to.
///
/// Receipts are opaque to the orchestrator. They are stored in tree slots and handed to the
/// parent job unchanged.
#[derive(
    Debug,
    Clone,
    Serialize,
    Deserialize,
    BorshSerialize,
    BorshDeserialize,
    PartialEq,
    Eq,
    Hash,
    Arbitrary,
    Default,
)]
pub struct ProofReceipt {
    proof: Proof,
    public_inputs: PublicInputs,
}

impl ProofReceipt {
    pub fn new(proof: Proof, public_inputs: PublicInputs) -> Self {
        Self {
            proof,
            public_inputs,
        }
    }

    pub fn proof(&self) -> &Proof {
        &self.proof
    }

    pub fn public_inputs(&self) -> &PublicInputs {
        &self.public_inputs
    }

    pub fn into_parts(self) -> (Proof, PublicInputs) {
        (self.proof, self.public_inputs)
    }
}
