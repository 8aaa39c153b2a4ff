pub mod inventory;

pub use inventory::BridgeInventory;
