//! Arena-style integer handles (spec.md §9 Design Notes).
//!
//! The source model has cyclic references (board ↔ link, job ↔ board); this
//! workspace breaks the cycle the way the teacher's `RawPduId`/short-id
//! newtypes do it — small `Copy` handles into a vector owned by one place
//! (`BoardGraph`), rather than `Rc`/`Weak` pairs.

use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl $name {
            pub fn new(raw: u32) -> Self {
                Self(raw)
            }

            pub fn get(self) -> u32 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(MachineId);
id_type!(BoardId);
id_type!(LinkId);
id_type!(JobId);
