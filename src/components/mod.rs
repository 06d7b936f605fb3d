pub mod mask_adapter;
pub mod ui_state;
