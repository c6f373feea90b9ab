// ── Enumeration state machine ──
//
// Drives a newly discovered entity through the ordered steps in
// `steps::STEP_ORDER`. Each step issues queries and records them as
// expected; responses clear expectations; an emptied expectation set
// completes the step and starts the next. The entity is advertised once
// every step has completed.
//
// All functions here run with the entity's mutex held. Outbound requests
// go to the caller's outbox and are sent after the lock is released.

pub mod failure;
pub mod query;
pub mod steps;

mod dynamic;
mod static_model;

use std::time::Instant;

use avdecc_api::{
    CommandStatus, DynamicInfo, DynamicInfoQuery, EntityId, PackedResult, Request, Response,
    ResponsePayload,
};
use tracing::{debug, error, info, warn};

use self::failure::{FailureClass, FailureContext, FailureOutcome};
use self::query::QueryKey;
use self::steps::EnumerationStep;
use crate::access;
use crate::controller::ControllerInner;
use crate::event::{ControllerEvent, QueryErrorKind};
use crate::model::{CompatibilityFlags, ControlledEntity};
use crate::pending::{Continuation, Outbox, Outgoing};
use crate::scheduler::DelayedQuery;
use crate::update::{self, UpdateOutcome};

// ── Step driver ─────────────────────────────────────────────────────

/// Advance enumeration as far as it can go without waiting on a response.
pub(crate) fn check_enumeration_steps(
    ctx: &ControllerInner,
    entity: &mut ControlledEntity,
    out: &mut Outbox,
) {
    loop {
        if entity.fatal_enumeration_error || entity.advertised {
            return;
        }
        if !entity.enumeration.expected.is_empty() {
            return;
        }
        if let Some(step) = entity.enumeration.current.take() {
            entity.enumeration.steps.remove(step);
            debug!(entity_id = %entity.entity_id(), %step, "enumeration step complete");
            complete_step(ctx, entity, step);
            continue;
        }
        let Some(step) = entity.enumeration.steps.next() else {
            advertise(ctx, entity);
            return;
        };
        entity.enumeration.current = Some(step);
        debug!(entity_id = %entity.entity_id(), %step, "starting enumeration step");
        start_step(ctx, entity, step, out);
    }
}

fn start_step(
    ctx: &ControllerInner,
    entity: &mut ControlledEntity,
    step: EnumerationStep,
    out: &mut Outbox,
) {
    match step {
        EnumerationStep::GetMilanInfo => expect_query(entity, QueryKey::MilanInfo, out),
        EnumerationStep::RegisterUnsol => expect_query(entity, QueryKey::RegisterUnsol, out),
        EnumerationStep::CheckPackedDynamicInfoSupported => {
            if ctx.config.packed_dynamic_info {
                expect_query(entity, QueryKey::PackedProbe, out);
            } else {
                entity.enumeration.packed_supported = Some(false);
            }
        }
        EnumerationStep::GetStaticModel => {
            expect_query(
                entity,
                QueryKey::descriptor(0, avdecc_api::DescriptorType::Entity, 0),
                out,
            );
        }
        EnumerationStep::GetDescriptorDynamicInfo => {
            let queries = dynamic::descriptor_dynamic_queries(entity);
            send_dynamic_queries(ctx, entity, queries, out);
        }
        EnumerationStep::GetDynamicInfo => {
            let queries = dynamic::dynamic_queries(entity);
            send_dynamic_queries(ctx, entity, queries, out);
        }
    }
}

fn complete_step(ctx: &ControllerInner, entity: &mut ControlledEntity, step: EnumerationStep) {
    if step == EnumerationStep::GetStaticModel {
        static_model::finalize_static_model(ctx, entity);
    }
}

fn advertise(ctx: &ControllerInner, entity: &mut ControlledEntity) {
    let elapsed = entity.enumeration.started_at.elapsed();
    entity.advertised = true;
    entity.statistics.enumeration_time = Some(elapsed);
    info!(
        entity_id = %entity.entity_id(),
        elapsed_ms = elapsed.as_millis(),
        from_cache = entity.enumeration.from_cache,
        compatibility = %entity.compatibility_flags(),
        "entity online"
    );
    ctx.emit(ControllerEvent::EntityOnline {
        entity_id: entity.entity_id(),
    });
}

// ── Query emission ──────────────────────────────────────────────────

/// Expect `key` and queue its discrete request, unless already expected.
pub(crate) fn expect_query(entity: &mut ControlledEntity, key: QueryKey, out: &mut Outbox) {
    if !entity.enumeration.expected.insert(key) {
        return;
    }
    out.push(Outgoing {
        target: entity.entity_id(),
        request: key.to_request(),
        continuation: Continuation::Enumeration {
            generation: entity.enumeration.generation,
            key,
        },
    });
}

/// Expect a batch of dynamic queries, sent packed or discrete depending
/// on what the entity supports.
pub(crate) fn send_dynamic_queries(
    ctx: &ControllerInner,
    entity: &mut ControlledEntity,
    queries: Vec<DynamicInfoQuery>,
    out: &mut Outbox,
) {
    let fresh: Vec<DynamicInfoQuery> = queries
        .into_iter()
        .filter(|query| entity.enumeration.expected.insert(QueryKey::Dynamic(*query)))
        .collect();
    if fresh.is_empty() {
        return;
    }

    let target = entity.entity_id();
    let generation = entity.enumeration.generation;
    if entity.enumeration.packed_supported == Some(true) {
        for chunk in fresh.chunks(ctx.config.max_packed_queries.max(1)) {
            out.push(Outgoing {
                target,
                request: Request::GetDynamicInfo(chunk.to_vec()),
                continuation: Continuation::PackedBatch {
                    generation,
                    queries: chunk.to_vec(),
                },
            });
        }
    } else {
        for query in fresh {
            out.push(discrete(target, generation, query));
        }
    }
}

fn discrete(target: EntityId, generation: u64, query: DynamicInfoQuery) -> Outgoing {
    let key = QueryKey::Dynamic(query);
    Outgoing {
        target,
        request: key.to_request(),
        continuation: Continuation::Enumeration { generation, key },
    }
}

/// Re-send a query whose retry delay elapsed, if it is still wanted.
pub(crate) fn fire_delayed_query(
    entity: &mut ControlledEntity,
    delayed: &DelayedQuery,
    out: &mut Outbox,
) {
    let state = &entity.enumeration;
    if state.generation != delayed.generation || !state.expected.contains(&delayed.key) {
        return;
    }
    debug!(entity_id = %delayed.entity_id, query = delayed.key.name(), "retrying query");
    out.push(Outgoing {
        target: delayed.entity_id,
        request: delayed.key.to_request(),
        continuation: Continuation::Enumeration {
            generation: delayed.generation,
            key: delayed.key,
        },
    });
}

// ── Response handling ───────────────────────────────────────────────

/// Access-state queries answered "by other" still carry the owner.
fn is_effective_success(key: QueryKey, status: CommandStatus) -> bool {
    status.is_success()
        || matches!(
            (key, status),
            (
                QueryKey::Dynamic(DynamicInfoQuery::AcquiredState),
                CommandStatus::AcquiredByOther
            ) | (
                QueryKey::Dynamic(DynamicInfoQuery::LockedState),
                CommandStatus::LockedByOther
            )
        )
}

/// Continuation for a single enumeration query.
pub(crate) fn on_query_response(
    ctx: &ControllerInner,
    entity_id: EntityId,
    generation: u64,
    key: QueryKey,
    response: Response,
) {
    let Some(handle) = ctx.registry.handle(entity_id) else {
        debug!(entity_id = %entity_id, query = key.name(), "response for departed entity");
        return;
    };
    let mut out = Outbox::new();
    let configuration_changed = {
        let mut entity = handle.lock();
        if entity.enumeration.generation != generation
            || !entity.enumeration.expected.contains(&key)
        {
            debug!(entity_id = %entity_id, query = key.name(), "dropping stale enumeration response");
            entity.statistics.aecp_unexpected_response_counter =
                entity.statistics.aecp_unexpected_response_counter.saturating_add(1);
            return;
        }

        let mut configuration_changed = false;
        if is_effective_success(key, response.status) {
            match apply_query_result(ctx, &mut entity, key, response.payload, &mut out) {
                Ok(outcome) => {
                    entity.enumeration.expected.remove(&key);
                    entity.enumeration.retries.remove(&key);
                    configuration_changed = outcome == UpdateOutcome::ConfigurationChanged;
                }
                Err(status) => handle_query_failure(ctx, &mut entity, key, status),
            }
        } else {
            handle_query_failure(ctx, &mut entity, key, response.status);
        }
        check_enumeration_steps(ctx, &mut entity, &mut out);
        configuration_changed
    };
    ctx.dispatch(out);
    if configuration_changed {
        ctx.restart_enumeration(entity_id);
    }
}

/// Continuation for a packed dynamic-info batch.
///
/// Successful sub-results are applied as they come, even when other
/// sub-results of the same batch failed.
pub(crate) fn on_packed_response(
    ctx: &ControllerInner,
    entity_id: EntityId,
    generation: u64,
    queries: Vec<DynamicInfoQuery>,
    response: Response,
) {
    let Some(handle) = ctx.registry.handle(entity_id) else {
        debug!(entity_id = %entity_id, "packed response for departed entity");
        return;
    };
    let mut out = Outbox::new();
    let configuration_changed = {
        let mut entity = handle.lock();
        if entity.enumeration.generation != generation {
            debug!(entity_id = %entity_id, "dropping stale packed response");
            entity.statistics.aecp_unexpected_response_counter =
                entity.statistics.aecp_unexpected_response_counter.saturating_add(1);
            return;
        }
        let queries: Vec<DynamicInfoQuery> = queries
            .into_iter()
            .filter(|q| entity.enumeration.expected.contains(&QueryKey::Dynamic(*q)))
            .collect();

        let mut configuration_changed = false;
        match (response.status, response.payload) {
            (status, _) if status.is_unsupported() => {
                warn!(entity_id = %entity_id, "packed dynamic info rejected, switching to discrete queries");
                entity.enumeration.packed_supported = Some(false);
                for query in queries {
                    out.push(discrete(entity_id, generation, query));
                }
            }
            (CommandStatus::Success, ResponsePayload::Packed(results)) => {
                configuration_changed =
                    apply_packed_results(ctx, &mut entity, &queries, results, &mut out);
            }
            (status, _) => {
                let status = if status.is_success() {
                    CommandStatus::ProtocolError
                } else {
                    status
                };
                for query in queries {
                    if entity.fatal_enumeration_error {
                        break;
                    }
                    handle_query_failure(ctx, &mut entity, QueryKey::Dynamic(query), status);
                }
            }
        }
        check_enumeration_steps(ctx, &mut entity, &mut out);
        configuration_changed
    };
    ctx.dispatch(out);
    if configuration_changed {
        ctx.restart_enumeration(entity_id);
    }
}

fn apply_packed_results(
    ctx: &ControllerInner,
    entity: &mut ControlledEntity,
    queries: &[DynamicInfoQuery],
    results: Vec<PackedResult>,
    out: &mut Outbox,
) -> bool {
    let mut configuration_changed = false;
    let mut failed: Vec<(QueryKey, CommandStatus)> = Vec::new();
    let mut results = results.into_iter();

    for query in queries {
        let key = QueryKey::Dynamic(*query);
        let Some(result) = results.next() else {
            failed.push((key, CommandStatus::ProtocolError));
            continue;
        };
        match result.value {
            Some(value) if is_effective_success(key, result.status) => {
                match apply_dynamic_result(ctx, entity, *query, &value, out) {
                    Ok(outcome) => {
                        entity.enumeration.expected.remove(&key);
                        entity.enumeration.retries.remove(&key);
                        configuration_changed |= outcome == UpdateOutcome::ConfigurationChanged;
                    }
                    Err(status) => failed.push((key, status)),
                }
            }
            _ => {
                let status = if result.status.is_success() {
                    CommandStatus::ProtocolError
                } else {
                    result.status
                };
                failed.push((key, status));
            }
        }
    }

    if failed.is_empty() {
        return configuration_changed;
    }

    let worst_status = failed
        .iter()
        .fold(CommandStatus::Success, |acc, (_, status)| failure::worst(acc, *status));
    debug!(
        entity_id = %entity.entity_id(),
        failed = failed.len(),
        worst = %worst_status,
        "packed dynamic info partially failed"
    );

    match failure::classify(worst_status) {
        // Nothing worse than transient failures: handle each on its own.
        FailureClass::Retry | FailureClass::Ignore => {
            let generation = entity.enumeration.generation;
            for (key, status) in failed {
                // A fallback restarted the static model; the rest is moot.
                if entity.enumeration.generation != generation {
                    break;
                }
                handle_query_failure(ctx, entity, key, status);
            }
        }
        // The batch is judged once, by its worst sub-failure.
        FailureClass::NotSupported | FailureClass::Fatal => {
            let mut worst_key = None;
            for (key, status) in failed {
                if worst_key.is_none() && status == worst_status {
                    worst_key = Some(key);
                } else {
                    entity.enumeration.expected.remove(&key);
                    entity.enumeration.retries.remove(&key);
                }
            }
            if let Some(key) = worst_key {
                handle_query_failure(ctx, entity, key, worst_status);
            }
        }
    }
    configuration_changed
}

fn apply_query_result(
    ctx: &ControllerInner,
    entity: &mut ControlledEntity,
    key: QueryKey,
    payload: ResponsePayload,
    out: &mut Outbox,
) -> Result<UpdateOutcome, CommandStatus> {
    match (key, payload) {
        (QueryKey::MilanInfo, ResponsePayload::MilanInfo(info)) => {
            entity.milan_info = Some(info);
            if info.protocol_version >= 1 && entity.compatibility.grant(CompatibilityFlags::MILAN) {
                info!(
                    entity_id = %entity.entity_id(),
                    version = %info.certification_version,
                    "entity is Milan compatible"
                );
            }
            Ok(UpdateOutcome::Changed)
        }
        (QueryKey::RegisterUnsol, _) => {
            entity.subscribed_to_unsolicited = true;
            ctx.notify(
                entity,
                ControllerEvent::UnsolicitedRegistrationChanged {
                    entity_id: entity.entity_id(),
                    subscribed: true,
                },
            );
            Ok(UpdateOutcome::Changed)
        }
        (QueryKey::PackedProbe, ResponsePayload::Packed(results)) => {
            entity.enumeration.packed_supported = Some(true);
            debug!(entity_id = %entity.entity_id(), "packed dynamic info supported");
            if let Some(PackedResult {
                status: CommandStatus::Success,
                value: Some(value),
            }) = results.into_iter().next()
            {
                update::apply_dynamic(ctx, entity, &value);
            }
            Ok(UpdateOutcome::Changed)
        }
        (
            QueryKey::Descriptor {
                configuration_index,
                descriptor_type,
                descriptor_index,
            },
            ResponsePayload::Descriptor(descriptor),
        ) => {
            if descriptor.descriptor_type() != descriptor_type {
                return Err(CommandStatus::ProtocolError);
            }
            static_model::on_descriptor(
                ctx,
                entity,
                configuration_index,
                descriptor_index,
                descriptor,
                out,
            )?;
            Ok(UpdateOutcome::Changed)
        }
        (QueryKey::Dynamic(query), ResponsePayload::Dynamic(value)) => {
            apply_dynamic_result(ctx, entity, query, &value, out)
        }
        _ => Err(CommandStatus::ProtocolError),
    }
}

fn apply_dynamic_result(
    ctx: &ControllerInner,
    entity: &mut ControlledEntity,
    query: DynamicInfoQuery,
    value: &DynamicInfo,
    out: &mut Outbox,
) -> Result<UpdateOutcome, CommandStatus> {
    let asked: &'static str = query.into();
    let answered: &'static str = value.into();
    if asked != answered {
        return Err(CommandStatus::ProtocolError);
    }
    let outcome = update::apply_dynamic(ctx, entity, value);
    dynamic::queue_follow_ups(ctx, entity, value, out);
    Ok(outcome)
}

// ── Failure handling ────────────────────────────────────────────────

fn handle_query_failure(
    ctx: &ControllerInner,
    entity: &mut ControlledEntity,
    key: QueryKey,
    status: CommandStatus,
) {
    let entity_id = entity.entity_id();
    let class = failure::classify(status);

    if class == FailureClass::Retry {
        let attempts = entity.enumeration.retries.entry(key).or_insert(0);
        if *attempts < ctx.config.max_query_retries {
            *attempts = attempts.saturating_add(1);
            debug!(
                entity_id = %entity_id,
                query = key.name(),
                %status,
                attempt = *attempts,
                "scheduling query retry"
            );
            ctx.scheduler.schedule_query(DelayedQuery {
                entity_id,
                generation: entity.enumeration.generation,
                key,
                fire_at: Instant::now() + ctx.config.retry_delay,
            });
            return;
        }
    }

    entity.enumeration.expected.remove(&key);
    entity.enumeration.retries.remove(&key);

    match key {
        QueryKey::PackedProbe => {
            debug!(entity_id = %entity_id, %status, "packed dynamic info not supported");
            entity.enumeration.packed_supported = Some(false);
            return;
        }
        QueryKey::Dynamic(DynamicInfoQuery::AcquiredState) => {
            access::update_acquired_state(ctx, entity, status, EntityId::NULL);
        }
        QueryKey::Dynamic(DynamicInfoQuery::LockedState) => {
            access::update_locked_state(ctx, entity, status, EntityId::NULL);
        }
        _ => {}
    }

    let policy = FailureContext {
        step: entity.enumeration.current,
        milan_version: entity.milan_version(),
        model_from_cache: entity.enumeration.from_cache,
    };
    match failure::resolve(key, class, policy) {
        FailureOutcome::Ignore => {
            debug!(entity_id = %entity_id, query = key.name(), %status, "ignoring query failure");
        }
        FailureOutcome::Downgrade(flags) => {
            warn!(
                entity_id = %entity_id,
                query = key.name(),
                %status,
                removed = %flags,
                "query failed, downgrading compatibility"
            );
            downgrade(ctx, entity, flags);
        }
        FailureOutcome::FallbackToStaticEnumeration => {
            warn!(
                entity_id = %entity_id,
                query = key.name(),
                %status,
                "cached model does not match entity, reading static model"
            );
            entity.tree = None;
            entity.enumeration.restart_static_model();
        }
        FailureOutcome::Fatal => {
            let kind = policy
                .step
                .map_or(QueryErrorKind::StaticModel, QueryErrorKind::from);
            error!(
                entity_id = %entity_id,
                query = key.name(),
                %status,
                %kind,
                "fatal enumeration error"
            );
            raise_fatal(ctx, entity, kind);
        }
    }
}

pub(crate) fn downgrade(ctx: &ControllerInner, entity: &mut ControlledEntity, flags: CompatibilityFlags) {
    if entity.compatibility.revoke(flags) {
        ctx.notify(
            entity,
            ControllerEvent::CompatibilityChanged {
                entity_id: entity.entity_id(),
                flags: entity.compatibility_flags(),
            },
        );
    }
}

pub(crate) fn raise_fatal(ctx: &ControllerInner, entity: &mut ControlledEntity, kind: QueryErrorKind) {
    entity.fatal_enumeration_error = true;
    entity.enumeration.expected.clear();
    entity.enumeration.retries.clear();
    entity.enumeration.current = None;
    entity.enumeration.steps = steps::EnumerationSteps::empty();
    entity.enumeration.generation = entity.enumeration.generation.wrapping_add(1);
    ctx.emit(ControllerEvent::EntityQueryError {
        entity_id: entity.entity_id(),
        kind,
    });
}
