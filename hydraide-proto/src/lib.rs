//! The wire protocol (spec §6): tonic/prost service definition plus the
//! DTO <-> domain-type conversions. Conversions live entirely at this
//! boundary so nothing upstream (hydraide-storage, hydraide-hydra) needs
//! to know the wire format exists.

mod convert;

pub mod wire {
    tonic::include_proto!("hydraide");
}

pub use convert::{
    content_value_from_wire, content_value_to_wire, duration_from_millis, event_to_wire,
    index_type_from_wire, index_type_to_wire, info_event_to_wire, order_from_wire, order_to_wire,
    rel_op_from_wire, rel_op_to_wire, status_type_to_wire, timestamp_from_wire, timestamp_to_wire,
    treasure_data_from_wire, treasure_to_wire,
};
