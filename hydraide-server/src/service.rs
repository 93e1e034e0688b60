//! The Gateway RPC implementation (spec §4.J): translates each wire call
//! into Name parsing, a Hydra summon, a vigil, and the matching Swamp
//! operation, then maps the result back onto the wire. Every handler is
//! wrapped in [`guarded`] (Observer tracking + panic catch) and, except for
//! the two streaming subscriptions, takes a Safeops shared permit first so
//! an in-flight shutdown can find and wait for it.
//!
//! A few read-only lookups (`IsSwampExist`, `Count`, `Get`, `GetAll`,
//! `GetByIndex`, `IsKeyExist`, the Uint32Slice inspectors) treat an
//! unregistered pattern the same as "nothing there" rather than failing
//! the call — a client polling a Swamp that genuinely has no data yet
//! shouldn't have to distinguish "empty" from "not registered". Mutating
//! calls (`Set`, `Destroy`, `Uint32SlicePush`/`Delete`, the increments)
//! still propagate `SwampNotRegistered` as an error, since creating data
//! under a pattern nobody declared is a client mistake worth surfacing.

use std::sync::Arc;
use std::time::Duration;

use hydraide_base::{invalid_argument, wrong_type, ErrorKind, Name, RelOp, SwampPattern};
use hydraide_hydra::Hydra;
use hydraide_proto::{
    duration_from_millis, index_type_from_wire, order_from_wire, rel_op_from_wire,
    status_type_to_wire, treasure_data_from_wire, treasure_to_wire, wire,
};
use hydraide_storage::{Swamp, SwampSettings};
use tonic::{Request, Response, Status};

use crate::error::to_status;
use crate::guard::{guarded, TreasureLease, Vigil};
use crate::streams::{EventSubscription, InfoSubscription};

/// Capacity of the bounded channel backing each event/info subscription.
/// A slow subscriber that falls behind this has its oldest events dropped
/// rather than stalling the writer (spec §4.E "drop on a full channel").
const SUBSCRIBER_CHANNEL_CAPACITY: usize = 256;

fn parse_name(swamp_name: &str) -> Result<Name, Status> {
    Name::load(swamp_name).map_err(to_status)
}

fn exists_or(result: hydraide_base::Result<bool>, default: bool) -> Result<bool, Status> {
    match result {
        Ok(v) => Ok(v),
        Err(e) if e.kind() == ErrorKind::SwampNotRegistered => Ok(default),
        Err(e) => Err(to_status(e)),
    }
}

fn parse_int_condition(raw: Option<wire::IncrementCondition>) -> Result<Option<(RelOp, i64)>, Status> {
    let Some(c) = raw else { return Ok(None) };
    let op = rel_op_from_wire(c.rel_op).map_err(to_status)?;
    match c.operand {
        Some(wire::increment_condition::Operand::IntOperand(v)) => Ok(Some((op, v))),
        _ => Err(Status::invalid_argument("condition.operand must be intOperand for an integer increment")),
    }
}

fn parse_uint_condition(raw: Option<wire::IncrementCondition>) -> Result<Option<(RelOp, u64)>, Status> {
    let Some(c) = raw else { return Ok(None) };
    let op = rel_op_from_wire(c.rel_op).map_err(to_status)?;
    match c.operand {
        Some(wire::increment_condition::Operand::UintOperand(v)) => Ok(Some((op, v))),
        _ => Err(Status::invalid_argument("condition.operand must be uintOperand for an unsigned increment")),
    }
}

fn parse_float_condition(raw: Option<wire::IncrementCondition>) -> Result<Option<(RelOp, f64)>, Status> {
    let Some(c) = raw else { return Ok(None) };
    let op = rel_op_from_wire(c.rel_op).map_err(to_status)?;
    match c.operand {
        Some(wire::increment_condition::Operand::FloatOperand(v)) => Ok(Some((op, v))),
        _ => Err(Status::invalid_argument("condition.operand must be floatOperand for a float increment")),
    }
}

fn narrow<T>(v: i64, label: &'static str) -> Result<T, Status>
where
    T: TryFrom<i64>,
{
    T::try_from(v).map_err(|_| to_status(wrong_type(format!("{label} out of range"))))
}

fn narrow_u<T>(v: u64, label: &'static str) -> Result<T, Status>
where
    T: TryFrom<u64>,
{
    T::try_from(v).map_err(|_| to_status(wrong_type(format!("{label} out of range"))))
}

pub struct GatewayService {
    hydra: Arc<Hydra>,
    default_close_after_idle: Duration,
    default_write_interval: Duration,
    default_max_file_size: u64,
}

impl GatewayService {
    pub fn new(
        hydra: Arc<Hydra>,
        default_close_after_idle: Duration,
        default_write_interval: Duration,
        default_max_file_size: u64,
    ) -> Self {
        GatewayService { hydra, default_close_after_idle, default_write_interval, default_max_file_size }
    }

    async fn summon(&self, name: &Name) -> Result<Arc<Swamp>, Status> {
        self.hydra.summon_swamp(name).await.map_err(to_status)
    }

    async fn handle_set_one(&self, req: wire::SwampSetRequest) -> wire::SwampSetResponse {
        let name = match parse_name(&req.swamp_name) {
            Ok(n) => n,
            Err(status) => {
                return wire::SwampSetResponse {
                    swamp_name: req.swamp_name,
                    statuses: vec![],
                    error_code: Some(status.message().to_string()),
                }
            }
        };
        let swamp = match self.summon(&name).await {
            Ok(s) => s,
            Err(status) => {
                return wire::SwampSetResponse {
                    swamp_name: name.get(),
                    statuses: vec![],
                    error_code: Some(status.message().to_string()),
                }
            }
        };
        let _vigil = Vigil::hold(swamp.clone());

        let mut statuses = Vec::with_capacity(req.key_values.len());
        let mut error_code = None;
        for kvp in req.key_values {
            let (key, data) = match treasure_data_from_wire(kvp) {
                Ok(pair) => pair,
                Err(e) => {
                    error_code.get_or_insert_with(|| format!("{:?}", e.kind()));
                    continue;
                }
            };

            let exists = swamp.is_key_exist(&key).await;
            if !exists && !req.create_if_not_exist {
                statuses.push(wire::KeyStatus { key, status: wire::StatusType::NotFound as i32 });
                continue;
            }
            if exists && !req.overwrite {
                statuses.push(wire::KeyStatus { key, status: wire::StatusType::NothingChanged as i32 });
                continue;
            }

            let lease = TreasureLease::acquire(&swamp, &key, true).await;
            let outcome: hydraide_base::Result<_> = async {
                swamp.set_content(&key, lease.id, data.value.clone()).await?;
                if let Some(at) = data.created_at {
                    swamp.set_created_at(&key, lease.id, at).await?;
                }
                if let Some(by) = data.created_by.clone() {
                    swamp.set_created_by(&key, lease.id, by).await?;
                }
                if let Some(at) = data.modified_at {
                    swamp.set_modified_at(&key, lease.id, at).await?;
                }
                if let Some(by) = data.modified_by.clone() {
                    swamp.set_modified_by(&key, lease.id, by).await?;
                }
                if data.expiration_time.is_some() {
                    swamp.set_expiration_time(&key, lease.id, data.expiration_time).await?;
                }
                swamp.save(&key, lease.id).await
            }
            .await;
            drop(lease);

            match outcome {
                Ok(status) => statuses.push(wire::KeyStatus { key, status: status_type_to_wire(status) as i32 }),
                Err(e) => {
                    error_code.get_or_insert_with(|| format!("{:?}", e.kind()));
                    statuses.push(wire::KeyStatus { key, status: wire::StatusType::NothingChanged as i32 });
                }
            }
        }

        wire::SwampSetResponse { swamp_name: name.get(), statuses, error_code }
    }

    async fn handle_get_one(&self, req: wire::SwampGetRequest) -> Result<wire::SwampGetResponse, Status> {
        let Ok(name) = Name::load(&req.swamp_name) else {
            return Ok(wire::SwampGetResponse { swamp_name: req.swamp_name, is_exist: false, treasures: vec![] });
        };
        let exists = exists_or(self.hydra.is_exist_swamp(&name), false)?;
        if !exists {
            return Ok(wire::SwampGetResponse { swamp_name: name.get(), is_exist: false, treasures: vec![] });
        }
        let swamp = self.summon(&name).await?;
        let _vigil = Vigil::hold(swamp.clone());
        let mut treasures = Vec::with_capacity(req.keys.len());
        for key in &req.keys {
            if let Some(t) = swamp.get(key).await {
                treasures.push(treasure_to_wire(&t));
            }
        }
        Ok(wire::SwampGetResponse { swamp_name: name.get(), is_exist: true, treasures })
    }

    async fn handle_delete_one(&self, req: wire::SwampDeleteRequest) -> wire::SwampDeleteResponse {
        let Ok(name) = Name::load(&req.swamp_name) else {
            return wire::SwampDeleteResponse { swamp_name: req.swamp_name, deleted_keys: vec![] };
        };
        let exists = exists_or(self.hydra.is_exist_swamp(&name), false).unwrap_or(false);
        if !exists {
            return wire::SwampDeleteResponse { swamp_name: name.get(), deleted_keys: vec![] };
        }
        let Ok(swamp) = self.summon(&name).await else {
            return wire::SwampDeleteResponse { swamp_name: name.get(), deleted_keys: vec![] };
        };
        let _vigil = Vigil::hold(swamp.clone());
        let mut deleted = Vec::with_capacity(req.keys.len());
        for key in &req.keys {
            if swamp.delete(key).await.unwrap_or(false) {
                deleted.push(key.clone());
            }
        }
        wire::SwampDeleteResponse { swamp_name: name.get(), deleted_keys: deleted }
    }
}

#[tonic::async_trait]
impl wire::gateway_server::Gateway for GatewayService {
    async fn register_swamp(
        &self,
        request: Request<wire::RegisterSwampRequest>,
    ) -> Result<Response<wire::RegisterSwampResponse>, Status> {
        let _permit = self.hydra.safeops().lock_system().await;
        guarded(self.hydra.observer(), "RegisterSwamp", async {
            let req = request.into_inner();
            let pattern = SwampPattern::parse(&req.swamp_pattern).map_err(to_status)?;
            let close_after_idle = req
                .close_after_idle_ms
                .map(duration_from_millis)
                .transpose()
                .map_err(to_status)?
                .unwrap_or(self.default_close_after_idle);
            let write_interval = req
                .write_interval_ms
                .map(duration_from_millis)
                .transpose()
                .map_err(to_status)?
                .unwrap_or(self.default_write_interval);
            let max_file_size = req.max_file_size.unwrap_or(self.default_max_file_size);
            let settings = SwampSettings::new(req.is_in_memory_swamp, close_after_idle, write_interval, max_file_size)
                .map_err(to_status)?;
            self.hydra.register_pattern(pattern, settings).map_err(to_status)?;
            Ok(Response::new(wire::RegisterSwampResponse {}))
        })
        .await
    }

    async fn deregister_swamp(
        &self,
        request: Request<wire::DeregisterSwampRequest>,
    ) -> Result<Response<wire::DeregisterSwampResponse>, Status> {
        let _permit = self.hydra.safeops().lock_system().await;
        guarded(self.hydra.observer(), "DeregisterSwamp", async {
            let req = request.into_inner();
            let pattern = SwampPattern::parse(&req.swamp_pattern).map_err(to_status)?;
            self.hydra.deregister_pattern(&pattern).map_err(to_status)?;
            Ok(Response::new(wire::DeregisterSwampResponse {}))
        })
        .await
    }

    async fn is_swamp_exist(
        &self,
        request: Request<wire::IsSwampExistRequest>,
    ) -> Result<Response<wire::IsSwampExistResponse>, Status> {
        let _permit = self.hydra.safeops().lock_system().await;
        guarded(self.hydra.observer(), "IsSwampExist", async {
            let req = request.into_inner();
            let name = parse_name(&req.swamp_name)?;
            let exists = exists_or(self.hydra.is_exist_swamp(&name), false)?;
            Ok(Response::new(wire::IsSwampExistResponse { exists }))
        })
        .await
    }

    async fn destroy(&self, request: Request<wire::DestroyRequest>) -> Result<Response<wire::DestroyResponse>, Status> {
        let _permit = self.hydra.safeops().lock_system().await;
        guarded(self.hydra.observer(), "Destroy", async {
            let req = request.into_inner();
            let name = parse_name(&req.swamp_name)?;
            let exists = self.hydra.is_exist_swamp(&name).map_err(to_status)?;
            if exists {
                let swamp = self.summon(&name).await?;
                // Deliberately no vigil here: `Swamp::destroy` itself refuses
                // while any vigil is held, and holding one ourselves would
                // make that check always fail.
                swamp.destroy().await.map_err(to_status)?;
            }
            Ok(Response::new(wire::DestroyResponse {}))
        })
        .await
    }

    async fn set(&self, request: Request<wire::SetRequest>) -> Result<Response<wire::SetResponse>, Status> {
        let _permit = self.hydra.safeops().lock_system().await;
        guarded(self.hydra.observer(), "Set", async {
            let req = request.into_inner();
            let mut swamps = Vec::with_capacity(req.swamps.len());
            for swamp_req in req.swamps {
                swamps.push(self.handle_set_one(swamp_req).await);
            }
            Ok(Response::new(wire::SetResponse { swamps }))
        })
        .await
    }

    async fn get(&self, request: Request<wire::GetRequest>) -> Result<Response<wire::GetResponse>, Status> {
        let _permit = self.hydra.safeops().lock_system().await;
        guarded(self.hydra.observer(), "Get", async {
            let req = request.into_inner();
            let mut swamps = Vec::with_capacity(req.swamps.len());
            for swamp_req in req.swamps {
                swamps.push(self.handle_get_one(swamp_req).await?);
            }
            Ok(Response::new(wire::GetResponse { swamps }))
        })
        .await
    }

    async fn get_all(&self, request: Request<wire::GetAllRequest>) -> Result<Response<wire::GetAllResponse>, Status> {
        let _permit = self.hydra.safeops().lock_system().await;
        guarded(self.hydra.observer(), "GetAll", async {
            let req = request.into_inner();
            let name = parse_name(&req.swamp_name)?;
            let exists = exists_or(self.hydra.is_exist_swamp(&name), false)?;
            if !exists {
                return Ok(Response::new(wire::GetAllResponse { treasures: vec![] }));
            }
            let swamp = self.summon(&name).await?;
            let _vigil = Vigil::hold(swamp.clone());
            let treasures = swamp.get_all().await.iter().map(treasure_to_wire).collect();
            Ok(Response::new(wire::GetAllResponse { treasures }))
        })
        .await
    }

    async fn delete(&self, request: Request<wire::DeleteRequest>) -> Result<Response<wire::DeleteResponse>, Status> {
        let _permit = self.hydra.safeops().lock_system().await;
        guarded(self.hydra.observer(), "Delete", async {
            let req = request.into_inner();
            let mut swamps = Vec::with_capacity(req.swamps.len());
            for swamp_req in req.swamps {
                swamps.push(self.handle_delete_one(swamp_req).await);
            }
            Ok(Response::new(wire::DeleteResponse { swamps }))
        })
        .await
    }

    async fn is_key_exist(
        &self,
        request: Request<wire::IsKeyExistRequest>,
    ) -> Result<Response<wire::IsKeyExistResponse>, Status> {
        let _permit = self.hydra.safeops().lock_system().await;
        guarded(self.hydra.observer(), "IsKeyExist", async {
            let req = request.into_inner();
            let name = parse_name(&req.swamp_name)?;
            let exists = exists_or(self.hydra.is_exist_swamp(&name), false)?;
            if !exists {
                return Ok(Response::new(wire::IsKeyExistResponse { exists: false }));
            }
            let swamp = self.summon(&name).await?;
            let _vigil = Vigil::hold(swamp.clone());
            Ok(Response::new(wire::IsKeyExistResponse { exists: swamp.is_key_exist(&req.key).await }))
        })
        .await
    }

    async fn count(&self, request: Request<wire::CountRequest>) -> Result<Response<wire::CountResponse>, Status> {
        let _permit = self.hydra.safeops().lock_system().await;
        guarded(self.hydra.observer(), "Count", async {
            let req = request.into_inner();
            let name = parse_name(&req.swamp_name)?;
            let exists = exists_or(self.hydra.is_exist_swamp(&name), false)?;
            if !exists {
                return Ok(Response::new(wire::CountResponse { count: 0 }));
            }
            let swamp = self.summon(&name).await?;
            let _vigil = Vigil::hold(swamp.clone());
            Ok(Response::new(wire::CountResponse { count: swamp.count().await as u64 }))
        })
        .await
    }

    async fn get_by_index(
        &self,
        request: Request<wire::GetByIndexRequest>,
    ) -> Result<Response<wire::GetByIndexResponse>, Status> {
        let _permit = self.hydra.safeops().lock_system().await;
        guarded(self.hydra.observer(), "GetByIndex", async {
            let req = request.into_inner();
            let name = parse_name(&req.swamp_name)?;
            let exists = exists_or(self.hydra.is_exist_swamp(&name), false)?;
            if !exists {
                return Ok(Response::new(wire::GetByIndexResponse { treasures: vec![] }));
            }
            let swamp = self.summon(&name).await?;
            let _vigil = Vigil::hold(swamp.clone());
            let index_type = index_type_from_wire(req.index_type).map_err(to_status)?;
            let order = order_from_wire(req.order_type).map_err(to_status)?;
            let treasures = swamp
                .get_by_index(index_type, order, req.from as usize, req.limit as usize)
                .await
                .iter()
                .map(treasure_to_wire)
                .collect();
            Ok(Response::new(wire::GetByIndexResponse { treasures }))
        })
        .await
    }

    async fn shift_expired_treasures(
        &self,
        request: Request<wire::ShiftExpiredTreasuresRequest>,
    ) -> Result<Response<wire::ShiftExpiredTreasuresResponse>, Status> {
        let _permit = self.hydra.safeops().lock_system().await;
        guarded(self.hydra.observer(), "ShiftExpiredTreasures", async {
            let req = request.into_inner();
            let name = parse_name(&req.swamp_name)?;
            let exists = exists_or(self.hydra.is_exist_swamp(&name), false)?;
            if !exists {
                return Ok(Response::new(wire::ShiftExpiredTreasuresResponse { treasures: vec![] }));
            }
            let swamp = self.summon(&name).await?;
            let _vigil = Vigil::hold(swamp.clone());
            let how_many = if req.how_many == 0 { usize::MAX } else { req.how_many as usize };
            let treasures = swamp.shift_expired_treasures(how_many).await.iter().map(treasure_to_wire).collect();
            Ok(Response::new(wire::ShiftExpiredTreasuresResponse { treasures }))
        })
        .await
    }

    async fn increment_int8(
        &self,
        request: Request<wire::IncrementIntRequest>,
    ) -> Result<Response<wire::IncrementIntResponse>, Status> {
        let _permit = self.hydra.safeops().lock_system().await;
        guarded(self.hydra.observer(), "IncrementInt8", async {
            let req = request.into_inner();
            let name = parse_name(&req.swamp_name)?;
            let swamp = self.summon(&name).await?;
            let _vigil = Vigil::hold(swamp.clone());
            let delta: i8 = narrow(req.increment_by, "incrementBy")?;
            let cond = parse_int_condition(req.condition)?
                .map(|(op, v)| narrow::<i8>(v, "condition.intOperand").map(|v| (op, v)))
                .transpose()?;
            let (value, is_incremented) = swamp.increment_i8(&req.key, delta, cond).await.map_err(to_status)?;
            Ok(Response::new(wire::IncrementIntResponse { value: value as i64, is_incremented }))
        })
        .await
    }

    async fn increment_int16(
        &self,
        request: Request<wire::IncrementIntRequest>,
    ) -> Result<Response<wire::IncrementIntResponse>, Status> {
        let _permit = self.hydra.safeops().lock_system().await;
        guarded(self.hydra.observer(), "IncrementInt16", async {
            let req = request.into_inner();
            let name = parse_name(&req.swamp_name)?;
            let swamp = self.summon(&name).await?;
            let _vigil = Vigil::hold(swamp.clone());
            let delta: i16 = narrow(req.increment_by, "incrementBy")?;
            let cond = parse_int_condition(req.condition)?
                .map(|(op, v)| narrow::<i16>(v, "condition.intOperand").map(|v| (op, v)))
                .transpose()?;
            let (value, is_incremented) = swamp.increment_i16(&req.key, delta, cond).await.map_err(to_status)?;
            Ok(Response::new(wire::IncrementIntResponse { value: value as i64, is_incremented }))
        })
        .await
    }

    async fn increment_int32(
        &self,
        request: Request<wire::IncrementIntRequest>,
    ) -> Result<Response<wire::IncrementIntResponse>, Status> {
        let _permit = self.hydra.safeops().lock_system().await;
        guarded(self.hydra.observer(), "IncrementInt32", async {
            let req = request.into_inner();
            let name = parse_name(&req.swamp_name)?;
            let swamp = self.summon(&name).await?;
            let _vigil = Vigil::hold(swamp.clone());
            let delta: i32 = narrow(req.increment_by, "incrementBy")?;
            let cond = parse_int_condition(req.condition)?
                .map(|(op, v)| narrow::<i32>(v, "condition.intOperand").map(|v| (op, v)))
                .transpose()?;
            let (value, is_incremented) = swamp.increment_i32(&req.key, delta, cond).await.map_err(to_status)?;
            Ok(Response::new(wire::IncrementIntResponse { value: value as i64, is_incremented }))
        })
        .await
    }

    async fn increment_int64(
        &self,
        request: Request<wire::IncrementIntRequest>,
    ) -> Result<Response<wire::IncrementIntResponse>, Status> {
        let _permit = self.hydra.safeops().lock_system().await;
        guarded(self.hydra.observer(), "IncrementInt64", async {
            let req = request.into_inner();
            let name = parse_name(&req.swamp_name)?;
            let swamp = self.summon(&name).await?;
            let _vigil = Vigil::hold(swamp.clone());
            let cond = parse_int_condition(req.condition)?;
            let (value, is_incremented) =
                swamp.increment_i64(&req.key, req.increment_by, cond).await.map_err(to_status)?;
            Ok(Response::new(wire::IncrementIntResponse { value, is_incremented }))
        })
        .await
    }

    async fn increment_uint8(
        &self,
        request: Request<wire::IncrementUintRequest>,
    ) -> Result<Response<wire::IncrementUintResponse>, Status> {
        let _permit = self.hydra.safeops().lock_system().await;
        guarded(self.hydra.observer(), "IncrementUint8", async {
            let req = request.into_inner();
            let name = parse_name(&req.swamp_name)?;
            let swamp = self.summon(&name).await?;
            let _vigil = Vigil::hold(swamp.clone());
            let delta: u8 = narrow_u(req.increment_by, "incrementBy")?;
            let cond = parse_uint_condition(req.condition)?
                .map(|(op, v)| narrow_u::<u8>(v, "condition.uintOperand").map(|v| (op, v)))
                .transpose()?;
            let (value, is_incremented) = swamp.increment_u8(&req.key, delta, cond).await.map_err(to_status)?;
            Ok(Response::new(wire::IncrementUintResponse { value: value as u64, is_incremented }))
        })
        .await
    }

    async fn increment_uint16(
        &self,
        request: Request<wire::IncrementUintRequest>,
    ) -> Result<Response<wire::IncrementUintResponse>, Status> {
        let _permit = self.hydra.safeops().lock_system().await;
        guarded(self.hydra.observer(), "IncrementUint16", async {
            let req = request.into_inner();
            let name = parse_name(&req.swamp_name)?;
            let swamp = self.summon(&name).await?;
            let _vigil = Vigil::hold(swamp.clone());
            let delta: u16 = narrow_u(req.increment_by, "incrementBy")?;
            let cond = parse_uint_condition(req.condition)?
                .map(|(op, v)| narrow_u::<u16>(v, "condition.uintOperand").map(|v| (op, v)))
                .transpose()?;
            let (value, is_incremented) = swamp.increment_u16(&req.key, delta, cond).await.map_err(to_status)?;
            Ok(Response::new(wire::IncrementUintResponse { value: value as u64, is_incremented }))
        })
        .await
    }

    async fn increment_uint32(
        &self,
        request: Request<wire::IncrementUintRequest>,
    ) -> Result<Response<wire::IncrementUintResponse>, Status> {
        let _permit = self.hydra.safeops().lock_system().await;
        guarded(self.hydra.observer(), "IncrementUint32", async {
            let req = request.into_inner();
            let name = parse_name(&req.swamp_name)?;
            let swamp = self.summon(&name).await?;
            let _vigil = Vigil::hold(swamp.clone());
            let delta: u32 = narrow_u(req.increment_by, "incrementBy")?;
            let cond = parse_uint_condition(req.condition)?
                .map(|(op, v)| narrow_u::<u32>(v, "condition.uintOperand").map(|v| (op, v)))
                .transpose()?;
            let (value, is_incremented) = swamp.increment_u32(&req.key, delta, cond).await.map_err(to_status)?;
            Ok(Response::new(wire::IncrementUintResponse { value: value as u64, is_incremented }))
        })
        .await
    }

    async fn increment_uint64(
        &self,
        request: Request<wire::IncrementUintRequest>,
    ) -> Result<Response<wire::IncrementUintResponse>, Status> {
        let _permit = self.hydra.safeops().lock_system().await;
        guarded(self.hydra.observer(), "IncrementUint64", async {
            let req = request.into_inner();
            let name = parse_name(&req.swamp_name)?;
            let swamp = self.summon(&name).await?;
            let _vigil = Vigil::hold(swamp.clone());
            let cond = parse_uint_condition(req.condition)?;
            let (value, is_incremented) =
                swamp.increment_u64(&req.key, req.increment_by, cond).await.map_err(to_status)?;
            Ok(Response::new(wire::IncrementUintResponse { value, is_incremented }))
        })
        .await
    }

    async fn increment_float32(
        &self,
        request: Request<wire::IncrementFloatRequest>,
    ) -> Result<Response<wire::IncrementFloatResponse>, Status> {
        let _permit = self.hydra.safeops().lock_system().await;
        guarded(self.hydra.observer(), "IncrementFloat32", async {
            let req = request.into_inner();
            let name = parse_name(&req.swamp_name)?;
            let swamp = self.summon(&name).await?;
            let _vigil = Vigil::hold(swamp.clone());
            let delta = req.increment_by as f32;
            let cond = parse_float_condition(req.condition)?.map(|(op, v)| (op, v as f32));
            let (value, is_incremented) = swamp.increment_f32(&req.key, delta, cond).await.map_err(to_status)?;
            Ok(Response::new(wire::IncrementFloatResponse { value: value as f64, is_incremented }))
        })
        .await
    }

    async fn increment_float64(
        &self,
        request: Request<wire::IncrementFloatRequest>,
    ) -> Result<Response<wire::IncrementFloatResponse>, Status> {
        let _permit = self.hydra.safeops().lock_system().await;
        guarded(self.hydra.observer(), "IncrementFloat64", async {
            let req = request.into_inner();
            let name = parse_name(&req.swamp_name)?;
            let swamp = self.summon(&name).await?;
            let _vigil = Vigil::hold(swamp.clone());
            let cond = parse_float_condition(req.condition)?;
            let (value, is_incremented) =
                swamp.increment_f64(&req.key, req.increment_by, cond).await.map_err(to_status)?;
            Ok(Response::new(wire::IncrementFloatResponse { value, is_incremented }))
        })
        .await
    }

    async fn uint32_slice_push(
        &self,
        request: Request<wire::Uint32SlicePushRequest>,
    ) -> Result<Response<wire::Uint32SlicePushResponse>, Status> {
        let _permit = self.hydra.safeops().lock_system().await;
        guarded(self.hydra.observer(), "Uint32SlicePush", async {
            let req = request.into_inner();
            let name = parse_name(&req.swamp_name)?;
            let swamp = self.summon(&name).await?;
            let _vigil = Vigil::hold(swamp.clone());
            let size = swamp.uint32_slice_push(&req.key, &req.values).await.map_err(to_status)?;
            Ok(Response::new(wire::Uint32SlicePushResponse { size: size as u64 }))
        })
        .await
    }

    async fn uint32_slice_delete(
        &self,
        request: Request<wire::Uint32SliceDeleteRequest>,
    ) -> Result<Response<wire::Uint32SliceDeleteResponse>, Status> {
        let _permit = self.hydra.safeops().lock_system().await;
        guarded(self.hydra.observer(), "Uint32SliceDelete", async {
            let req = request.into_inner();
            let name = parse_name(&req.swamp_name)?;
            let swamp = self.summon(&name).await?;
            let _vigil = Vigil::hold(swamp.clone());
            let size = swamp.uint32_slice_delete(&req.key, &req.values).await.map_err(to_status)?;
            Ok(Response::new(wire::Uint32SliceDeleteResponse { size: size as u64 }))
        })
        .await
    }

    async fn uint32_slice_size(
        &self,
        request: Request<wire::Uint32SliceSizeRequest>,
    ) -> Result<Response<wire::Uint32SliceSizeResponse>, Status> {
        let _permit = self.hydra.safeops().lock_system().await;
        guarded(self.hydra.observer(), "Uint32SliceSize", async {
            let req = request.into_inner();
            let name = parse_name(&req.swamp_name)?;
            let exists = exists_or(self.hydra.is_exist_swamp(&name), false)?;
            if !exists {
                return Ok(Response::new(wire::Uint32SliceSizeResponse { size: 0 }));
            }
            let swamp = self.summon(&name).await?;
            let _vigil = Vigil::hold(swamp.clone());
            let size = swamp.uint32_slice_size(&req.key).await.unwrap_or(0);
            Ok(Response::new(wire::Uint32SliceSizeResponse { size: size as u64 }))
        })
        .await
    }

    async fn uint32_slice_is_value_exist(
        &self,
        request: Request<wire::Uint32SliceIsValueExistRequest>,
    ) -> Result<Response<wire::Uint32SliceIsValueExistResponse>, Status> {
        let _permit = self.hydra.safeops().lock_system().await;
        guarded(self.hydra.observer(), "Uint32SliceIsValueExist", async {
            let req = request.into_inner();
            let name = parse_name(&req.swamp_name)?;
            let exists = exists_or(self.hydra.is_exist_swamp(&name), false)?;
            if !exists {
                return Ok(Response::new(wire::Uint32SliceIsValueExistResponse { exists: false }));
            }
            let swamp = self.summon(&name).await?;
            let _vigil = Vigil::hold(swamp.clone());
            let exists = swamp.uint32_slice_is_value_exist(&req.key, req.value).await.unwrap_or(false);
            Ok(Response::new(wire::Uint32SliceIsValueExistResponse { exists }))
        })
        .await
    }

    type SubscribeToEventsStream = EventSubscription;

    async fn subscribe_to_events(
        &self,
        request: Request<wire::SubscribeToEventsRequest>,
    ) -> Result<Response<Self::SubscribeToEventsStream>, Status> {
        // No Safeops permit: a live stream must not block graceful shutdown.
        guarded(self.hydra.observer(), "SubscribeToEvents", async {
            let req = request.into_inner();
            let name = parse_name(&req.swamp_name)?;
            let swamp = self.summon(&name).await?;
            let (id, rx) = swamp.subscribe_to_events(SUBSCRIBER_CHANNEL_CAPACITY);
            Ok(Response::new(EventSubscription::new(swamp, id, rx)))
        })
        .await
    }

    type SubscribeToInfoStream = InfoSubscription;

    async fn subscribe_to_info(
        &self,
        request: Request<wire::SubscribeToInfoRequest>,
    ) -> Result<Response<Self::SubscribeToInfoStream>, Status> {
        guarded(self.hydra.observer(), "SubscribeToInfo", async {
            let req = request.into_inner();
            let name = parse_name(&req.swamp_name)?;
            let swamp = self.summon(&name).await?;
            let (id, rx) = swamp.subscribe_to_info(SUBSCRIBER_CHANNEL_CAPACITY);
            Ok(Response::new(InfoSubscription::new(swamp, id, rx)))
        })
        .await
    }

    async fn lock(&self, request: Request<wire::LockRequest>) -> Result<Response<wire::LockResponse>, Status> {
        let _permit = self.hydra.safeops().lock_system().await;
        guarded(self.hydra.observer(), "Lock", async {
            let req = request.into_inner();
            let ttl = duration_from_millis(req.ttl_ms as i64).map_err(to_status)?;
            let id = self.hydra.locker().lock(&req.key, ttl).await;
            Ok(Response::new(wire::LockResponse { lock_id: id.to_string() }))
        })
        .await
    }

    async fn unlock(&self, request: Request<wire::UnlockRequest>) -> Result<Response<wire::UnlockResponse>, Status> {
        let _permit = self.hydra.safeops().lock_system().await;
        guarded(self.hydra.observer(), "Unlock", async {
            let req = request.into_inner();
            let id = uuid::Uuid::parse_str(&req.lock_id).map_err(|_| to_status(invalid_argument("lockId is not a valid uuid")))?;
            self.hydra.locker().unlock(&req.key, id).await.map_err(to_status)?;
            Ok(Response::new(wire::UnlockResponse {}))
        })
        .await
    }

    async fn heartbeat(
        &self,
        request: Request<wire::HeartbeatRequest>,
    ) -> Result<Response<wire::HeartbeatResponse>, Status> {
        // Deliberately bypasses Safeops and the Observer: a liveness probe
        // must answer even while every other RPC is draining for shutdown.
        let req = request.into_inner();
        Ok(Response::new(wire::HeartbeatResponse { pong: req.ping }))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use hydraide_proto::wire::gateway_server::Gateway;
    use hydraide_storage::ContentValue;
    use std::time::Duration as StdDuration;
    use test_log::test;
    use tonic::Code;

    fn service(dir: &std::path::Path) -> GatewayService {
        let hydra = Hydra::new(dir.to_path_buf(), 1000);
        GatewayService::new(
            hydra,
            StdDuration::from_secs(3600),
            StdDuration::from_secs(1),
            8 * 1024 * 1024,
        )
    }

    fn string_kvp(key: &str, value: &str) -> wire::KeyValuePair {
        wire::KeyValuePair {
            key: key.to_string(),
            value: Some(wire::key_value_pair::Value::StringValue(value.to_string())),
            created_at_unix_nano: None,
            created_by: None,
            modified_at_unix_nano: None,
            modified_by: None,
            expires_at_unix_nano: None,
        }
    }

    async fn register(svc: &GatewayService, pattern: &str, in_memory: bool) {
        svc.register_swamp(Request::new(wire::RegisterSwampRequest {
            swamp_pattern: pattern.to_string(),
            is_in_memory_swamp: in_memory,
            close_after_idle_ms: Some(60_000),
            write_interval_ms: Some(1_000),
            max_file_size: Some(1 << 20),
        }))
        .await
        .unwrap();
    }

    #[test]
    fn narrow_rejects_out_of_range_values() {
        assert_eq!(narrow::<i8>(100, "x").unwrap(), 100i8);
        assert!(narrow::<i8>(200, "x").is_err());
        assert_eq!(narrow_u::<u8>(200, "x").unwrap(), 200u8);
        assert!(narrow_u::<u8>(300, "x").is_err());
    }

    #[test]
    fn parse_int_condition_roundtrips_and_rejects_wrong_operand() {
        assert_eq!(parse_int_condition(None).unwrap(), None);

        let cond = wire::IncrementCondition {
            rel_op: wire::RelOp::Gt as i32,
            operand: Some(wire::increment_condition::Operand::IntOperand(5)),
        };
        assert_eq!(parse_int_condition(Some(cond)).unwrap(), Some((RelOp::Gt, 5)));

        let wrong = wire::IncrementCondition {
            rel_op: wire::RelOp::Gt as i32,
            operand: Some(wire::increment_condition::Operand::UintOperand(5)),
        };
        assert!(parse_int_condition(Some(wrong)).is_err());
    }

    #[test]
    fn exists_or_maps_swamp_not_registered_to_the_default() {
        assert_eq!(exists_or(Ok(true), false).unwrap(), true);
        let not_registered: hydraide_base::Result<bool> = Err(hydraide_base::swamp_not_registered("a/b/c"));
        assert_eq!(exists_or(not_registered, false).unwrap(), false);
        let other: hydraide_base::Result<bool> = Err(hydraide_base::invalid_argument("bad"));
        assert!(exists_or(other, false).is_err());
    }

    #[tokio::test]
    async fn set_then_get_roundtrips_a_string_value() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        register(&svc, "dizzlets/*/*", true).await;

        let set_resp = svc
            .set(Request::new(wire::SetRequest {
                swamps: vec![wire::SwampSetRequest {
                    island_id: 0,
                    swamp_name: "dizzlets/testing/roundtrip".to_string(),
                    create_if_not_exist: true,
                    overwrite: true,
                    key_values: vec![string_kvp("k1", "hello")],
                }],
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(set_resp.swamps[0].statuses[0].status, wire::StatusType::New as i32);

        let get_resp = svc
            .get(Request::new(wire::GetRequest {
                swamps: vec![wire::SwampGetRequest {
                    island_id: 0,
                    swamp_name: "dizzlets/testing/roundtrip".to_string(),
                    keys: vec!["k1".to_string()],
                }],
            }))
            .await
            .unwrap()
            .into_inner();
        let swamp = &get_resp.swamps[0];
        assert!(swamp.is_exist);
        assert_eq!(swamp.treasures.len(), 1);
        assert_eq!(
            swamp.treasures[0].value,
            Some(wire::key_value_pair::Value::StringValue("hello".to_string()))
        );
    }

    #[tokio::test]
    async fn get_on_a_never_registered_swamp_reports_not_exist_instead_of_erroring() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());

        let resp = svc
            .get(Request::new(wire::GetRequest {
                swamps: vec![wire::SwampGetRequest {
                    island_id: 0,
                    swamp_name: "dizzlets/testing/nope".to_string(),
                    keys: vec!["k1".to_string()],
                }],
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(!resp.swamps[0].is_exist);
        assert!(resp.swamps[0].treasures.is_empty());
    }

    #[tokio::test]
    async fn set_without_create_if_not_exist_reports_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        register(&svc, "dizzlets/*/*", true).await;

        let resp = svc
            .set(Request::new(wire::SetRequest {
                swamps: vec![wire::SwampSetRequest {
                    island_id: 0,
                    swamp_name: "dizzlets/testing/missing".to_string(),
                    create_if_not_exist: false,
                    overwrite: true,
                    key_values: vec![string_kvp("k1", "hello")],
                }],
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(resp.swamps[0].statuses[0].status, wire::StatusType::NotFound as i32);
    }

    #[tokio::test]
    async fn destroy_on_an_unregistered_pattern_is_a_client_error() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        let status = svc
            .destroy(Request::new(wire::DestroyRequest { island_id: 0, swamp_name: "a/b/c".to_string() }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::FailedPrecondition);
    }

    #[tokio::test]
    async fn increment_int32_starts_from_zero_and_honors_a_condition() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        register(&svc, "counters/*/*", true).await;

        let resp = svc
            .increment_int32(Request::new(wire::IncrementIntRequest {
                island_id: 0,
                swamp_name: "counters/testing/hits".to_string(),
                key: "k1".to_string(),
                increment_by: 5,
                condition: None,
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(resp.value, 5);
        assert!(resp.is_incremented);

        let blocked = svc
            .increment_int32(Request::new(wire::IncrementIntRequest {
                island_id: 0,
                swamp_name: "counters/testing/hits".to_string(),
                key: "k1".to_string(),
                increment_by: 5,
                condition: Some(wire::IncrementCondition {
                    rel_op: wire::RelOp::Gt as i32,
                    operand: Some(wire::increment_condition::Operand::IntOperand(100)),
                }),
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(blocked.value, 5);
        assert!(!blocked.is_incremented);
    }

    #[tokio::test]
    async fn uint32_slice_push_then_size_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        register(&svc, "tags/*/*", true).await;

        let push = svc
            .uint32_slice_push(Request::new(wire::Uint32SlicePushRequest {
                island_id: 0,
                swamp_name: "tags/testing/t1".to_string(),
                key: "k1".to_string(),
                values: vec![1, 2, 3],
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(push.size, 3);

        let exist = svc
            .uint32_slice_is_value_exist(Request::new(wire::Uint32SliceIsValueExistRequest {
                island_id: 0,
                swamp_name: "tags/testing/t1".to_string(),
                key: "k1".to_string(),
                value: 2,
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(exist.exists);

        let delete = svc
            .uint32_slice_delete(Request::new(wire::Uint32SliceDeleteRequest {
                island_id: 0,
                swamp_name: "tags/testing/t1".to_string(),
                key: "k1".to_string(),
                values: vec![2],
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(delete.size, 2);
    }

    #[tokio::test]
    async fn lock_then_unlock_roundtrips_and_rejects_a_bad_uuid() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());

        let lock = svc
            .lock(Request::new(wire::LockRequest { key: "k1".to_string(), ttl_ms: 5_000 }))
            .await
            .unwrap()
            .into_inner();
        svc.unlock(Request::new(wire::UnlockRequest { key: "k1".to_string(), lock_id: lock.lock_id }))
            .await
            .unwrap();

        let status = svc
            .unlock(Request::new(wire::UnlockRequest { key: "k1".to_string(), lock_id: "not-a-uuid".to_string() }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn heartbeat_echoes_the_ping() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        let resp = svc
            .heartbeat(Request::new(wire::HeartbeatRequest { ping: "ping".to_string() }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(resp.pong, "ping");
    }

    #[tokio::test]
    async fn get_all_returns_every_treasure_in_the_swamp() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        register(&svc, "dizzlets/*/*", true).await;
        svc.set(Request::new(wire::SetRequest {
            swamps: vec![wire::SwampSetRequest {
                island_id: 0,
                swamp_name: "dizzlets/testing/all".to_string(),
                create_if_not_exist: true,
                overwrite: true,
                key_values: vec![string_kvp("a", "1"), string_kvp("b", "2")],
            }],
        }))
        .await
        .unwrap();

        let resp = svc
            .get_all(Request::new(wire::GetAllRequest { island_id: 0, swamp_name: "dizzlets/testing/all".to_string() }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(resp.treasures.len(), 2);
    }
}
