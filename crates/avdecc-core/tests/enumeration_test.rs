// Integration tests for entity discovery and enumeration, driven through
// the public controller API with a recording transport.

#![allow(clippy::unwrap_used)]

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;

use avdecc_api::{
    CommandStatus, Descriptor, DescriptorType, DynamicInfo, DynamicInfoQuery, EntityCapabilities,
    EntityDescriptor, EntityId, Request, ResponsePayload, StreamDescriptor, StreamDirection,
    StreamFormat, StreamIdentification, StreamInfo,
};
use avdecc_core::{
    AcquireState, CompatibilityFlags, ControllerConfig, ControllerEvent, EntityModelCache,
    QueryErrorKind,
};

use common::{ENTITY_A, ENTITY_B, FakeEntity, Harness, PEER, discrete_config};

fn descriptor_reads(requests: &[Request], wanted: DescriptorType) -> usize {
    requests
        .iter()
        .filter(|r| {
            matches!(r, Request::ReadDescriptor { descriptor_type, .. } if *descriptor_type == wanted)
        })
        .count()
}

// ── Happy path ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_enumeration_advertises_entity_once() {
    let mut harness = Harness::new(ControllerConfig::default());
    let fake = FakeEntity::new(ENTITY_A);

    let requests = harness.enumerate(&fake);

    assert_eq!(requests[0], Request::RegisterUnsolicitedNotifications);
    assert_eq!(
        requests[1],
        Request::GetDynamicInfo(vec![DynamicInfoQuery::Counters {
            descriptor_type: DescriptorType::Entity,
            descriptor_index: 0,
        }])
    );
    assert_eq!(
        requests[2],
        Request::ReadDescriptor {
            configuration_index: 0,
            descriptor_type: DescriptorType::Entity,
            descriptor_index: 0,
        }
    );

    // Field changes during enumeration stay hidden; only the online event shows.
    assert_eq!(
        harness.drain_events(),
        vec![ControllerEvent::EntityOnline { entity_id: ENTITY_A }]
    );

    let controller = &harness.controller;
    assert!(controller.is_advertised(ENTITY_A));
    assert_eq!(controller.entity_ids(), vec![ENTITY_A]);
    assert_eq!(controller.pending_requests(), 0);

    let entity = controller.entity_snapshot(ENTITY_A).unwrap();
    assert!(entity.is_subscribed_to_unsolicited_notifications());
    assert!(!entity.is_model_from_cache());
    assert!(entity.pending_enumeration_steps().next().is_none());
    assert_eq!(entity.acquire_state(), AcquireState::NotAcquired);
    assert_eq!(entity.compatibility_flags(), CompatibilityFlags::IEEE17221);
    assert!(entity.statistics().enumeration_time.is_some());

    let model = entity.model().unwrap();
    assert_eq!(model.dynamic_model.entity_name, "Stagebox");
    let configuration = model.current_configuration().unwrap();
    assert!(configuration.dynamic_model.is_active_configuration);
    assert_eq!(
        configuration.stream_inputs[&0].dynamic_model.stream_info.as_ref().unwrap().stream_id,
        0x0A0B
    );
    assert_eq!(entity.identify_control_index(), Some(0));
}

#[tokio::test]
async fn test_milan_info_is_read_first() {
    let harness = Harness::new(ControllerConfig::default());
    let fake = FakeEntity::new(ENTITY_A).milan();

    let requests = harness.enumerate(&fake);

    assert_eq!(requests[0], Request::GetMilanInfo);
    assert_eq!(requests[1], Request::RegisterUnsolicitedNotifications);

    let entity = harness.controller.entity_snapshot(ENTITY_A).unwrap();
    assert!(entity.is_advertised());
    assert!(
        entity
            .compatibility_flags()
            .contains(CompatibilityFlags::IEEE17221.union(CompatibilityFlags::MILAN))
    );
    assert_eq!(entity.milan_info().unwrap().protocol_version, 1);
}

#[tokio::test]
async fn test_discrete_queries_when_packed_disabled() {
    let harness = Harness::new(discrete_config());
    let fake = FakeEntity::new(ENTITY_A);

    let requests = harness.enumerate(&fake);

    assert!(!requests.iter().any(|r| matches!(r, Request::GetDynamicInfo(_))));
    assert!(requests.contains(&Request::Get(DynamicInfoQuery::AcquiredState)));
    assert!(harness.controller.is_advertised(ENTITY_A));
}

#[tokio::test]
async fn test_packed_probe_rejection_falls_back_to_discrete() {
    let harness = Harness::new(ControllerConfig::default());
    let fake = FakeEntity::new(ENTITY_A).without_packed();

    let requests = harness.enumerate(&fake);

    let packed = requests
        .iter()
        .filter(|r| matches!(r, Request::GetDynamicInfo(_)))
        .count();
    assert_eq!(packed, 1, "only the probe is sent packed");
    assert!(requests.contains(&Request::Get(DynamicInfoQuery::LockedState)));
    assert!(harness.controller.is_advertised(ENTITY_A));
}

// ── Model cache ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_second_entity_of_same_model_uses_cache() {
    let harness = Harness::new(ControllerConfig::default());
    let fake_a = FakeEntity::new(ENTITY_A);
    let fake_b = FakeEntity::new(ENTITY_B);

    harness.enumerate(&fake_a);
    assert_eq!(harness.controller.cache().len(), 1);

    let requests = harness.enumerate(&fake_b);

    assert_eq!(descriptor_reads(&requests, DescriptorType::Entity), 1);
    assert_eq!(descriptor_reads(&requests, DescriptorType::Configuration), 0);
    assert!(requests.iter().any(|r| matches!(
        r,
        Request::GetDynamicInfo(queries)
            if queries.iter().any(|q| matches!(q, DynamicInfoQuery::ObjectName { .. }))
    )));

    let entity = harness.controller.entity_snapshot(ENTITY_B).unwrap();
    assert!(entity.is_advertised());
    assert!(entity.is_model_from_cache());
}

#[tokio::test]
async fn test_cached_model_mismatch_reads_static_model() {
    let cache = Arc::new(EntityModelCache::new());
    let harness = Harness::with_cache(ControllerConfig::default(), cache);
    let fake_a = FakeEntity::new(ENTITY_A);
    let fake_b = FakeEntity::new(ENTITY_B).failing_queries(|query| {
        matches!(query, DynamicInfoQuery::ObjectName { .. })
            .then_some(CommandStatus::NotImplemented)
    });

    harness.enumerate(&fake_a);
    let requests = harness.enumerate(&fake_b);

    assert_eq!(descriptor_reads(&requests, DescriptorType::Entity), 2);
    assert_eq!(descriptor_reads(&requests, DescriptorType::Configuration), 1);

    let entity = harness.controller.entity_snapshot(ENTITY_B).unwrap();
    assert!(entity.is_advertised());
    assert!(!entity.is_model_from_cache());
    assert!(entity.compatibility_flags().contains(CompatibilityFlags::IEEE17221));
}

#[tokio::test]
async fn test_missing_object_name_keeps_cached_model() {
    let cache = Arc::new(EntityModelCache::new());
    let harness = Harness::with_cache(ControllerConfig::default(), cache);
    let fake_a = FakeEntity::new(ENTITY_A);
    let fake_b = FakeEntity::new(ENTITY_B).failing_queries(|query| {
        matches!(query, DynamicInfoQuery::ObjectName { .. })
            .then_some(CommandStatus::NoSuchDescriptor)
    });

    harness.enumerate(&fake_a);
    let requests = harness.enumerate(&fake_b);

    assert_eq!(descriptor_reads(&requests, DescriptorType::Entity), 1);
    assert_eq!(descriptor_reads(&requests, DescriptorType::Configuration), 0);
    let entity = harness.controller.entity_snapshot(ENTITY_B).unwrap();
    assert!(entity.is_advertised());
    assert!(entity.is_model_from_cache());
}

#[tokio::test]
async fn test_disabled_cache_reads_every_model() {
    let harness = Harness::new(ControllerConfig::default());
    harness.controller.cache().disable();

    harness.enumerate(&FakeEntity::new(ENTITY_A));
    let requests = harness.enumerate(&FakeEntity::new(ENTITY_B));

    assert_eq!(descriptor_reads(&requests, DescriptorType::Configuration), 1);
    assert!(harness.controller.cache().is_empty());
}

// ── Failure policy ──────────────────────────────────────────────────

#[tokio::test]
async fn test_packed_partial_failure_keeps_successes() {
    let harness = Harness::new(ControllerConfig::default());
    let fake = FakeEntity::new(ENTITY_A).failing_queries(|query| {
        matches!(query, DynamicInfoQuery::AvbInfo { .. }).then_some(CommandStatus::NoSuchDescriptor)
    });

    harness.enumerate(&fake);

    let entity = harness.controller.entity_snapshot(ENTITY_A).unwrap();
    assert!(entity.is_advertised());
    assert_eq!(entity.compatibility_flags(), CompatibilityFlags::IEEE17221);
    let configuration = entity.model().unwrap().current_configuration().unwrap();
    assert!(configuration.avb_interfaces[&0].dynamic_model.avb_info.is_none());
    assert!(configuration.stream_outputs[&0].dynamic_model.stream_info.is_some());
}

#[tokio::test]
async fn test_milan_entity_downgraded_on_missing_milan_query() {
    let harness = Harness::new(ControllerConfig::default());
    let fake = FakeEntity::new(ENTITY_A).milan().failing_queries(|query| {
        matches!(query, DynamicInfoQuery::AvbInfo { .. }).then_some(CommandStatus::NoSuchDescriptor)
    });

    harness.enumerate(&fake);

    let entity = harness.controller.entity_snapshot(ENTITY_A).unwrap();
    assert!(entity.is_advertised());
    assert!(!entity.compatibility_flags().contains(CompatibilityFlags::MILAN));
    assert!(entity.compatibility_flags().contains(CompatibilityFlags::IEEE17221));
}

#[tokio::test]
async fn test_failed_registration_does_not_stop_plain_entity() {
    let harness = Harness::new(ControllerConfig::default());
    let fake = FakeEntity::new(ENTITY_A);
    fake.fail_once(
        Request::RegisterUnsolicitedNotifications,
        CommandStatus::InternalError,
    );

    harness.enumerate(&fake);

    let entity = harness.controller.entity_snapshot(ENTITY_A).unwrap();
    assert!(entity.is_advertised());
    assert!(!entity.got_fatal_enumeration_error());
    assert!(!entity.is_subscribed_to_unsolicited_notifications());
    assert_eq!(entity.compatibility_flags(), CompatibilityFlags::IEEE17221);
}

#[tokio::test]
async fn test_failed_registration_costs_milan_entity_its_milan_flag() {
    let harness = Harness::new(ControllerConfig::default());
    let fake = FakeEntity::new(ENTITY_A).milan();
    fake.fail_once(
        Request::RegisterUnsolicitedNotifications,
        CommandStatus::InternalError,
    );

    harness.enumerate(&fake);

    let entity = harness.controller.entity_snapshot(ENTITY_A).unwrap();
    assert!(entity.is_advertised());
    assert!(!entity.got_fatal_enumeration_error());
    assert!(!entity.compatibility_flags().contains(CompatibilityFlags::MILAN));
    assert!(entity.compatibility_flags().contains(CompatibilityFlags::IEEE17221));
}

fn long_named(entity_id: EntityId) -> FakeEntity {
    FakeEntity::new(entity_id).with_descriptor(
        DescriptorType::Entity,
        0,
        Descriptor::Entity(EntityDescriptor {
            entity_id,
            entity_model_id: common::MODEL_ID,
            entity_name: "x".repeat(65),
            configurations_count: 1,
            ..EntityDescriptor::default()
        }),
    )
}

#[tokio::test]
async fn test_strict_sanity_failure_is_fatal() {
    let mut harness = Harness::new(ControllerConfig {
        strict_sanity_checks: true,
        ..ControllerConfig::default()
    });

    harness.enumerate(&long_named(ENTITY_A));

    let entity = harness.controller.entity_snapshot(ENTITY_A).unwrap();
    assert!(entity.got_fatal_enumeration_error());
    assert!(!entity.is_advertised());
    assert!(harness.controller.cache().is_empty());
    assert!(harness.drain_events().contains(&ControllerEvent::EntityQueryError {
        entity_id: ENTITY_A,
        kind: QueryErrorKind::SanityCheck,
    }));
}

#[tokio::test]
async fn test_soft_sanity_failure_marks_entity_misbehaving() {
    let harness = Harness::new(ControllerConfig::default());

    harness.enumerate(&long_named(ENTITY_A));

    let entity = harness.controller.entity_snapshot(ENTITY_A).unwrap();
    assert!(entity.is_advertised());
    assert!(!entity.got_fatal_enumeration_error());
    let flags = entity.compatibility_flags();
    assert!(!flags.contains(CompatibilityFlags::IEEE17221));
    assert!(flags.contains(CompatibilityFlags::MISBEHAVING));
    assert!(harness.controller.cache().is_empty());
}

#[tokio::test]
async fn test_missing_entity_descriptor_is_fatal() {
    let mut harness = Harness::new(discrete_config());
    let fake = FakeEntity::new(ENTITY_A);
    fake.fail_once(
        Request::ReadDescriptor {
            configuration_index: 0,
            descriptor_type: DescriptorType::Entity,
            descriptor_index: 0,
        },
        CommandStatus::NotImplemented,
    );

    harness.enumerate(&fake);

    let entity = harness.controller.entity_snapshot(ENTITY_A).unwrap();
    assert!(entity.got_fatal_enumeration_error());
    assert!(!entity.is_advertised());
    assert!(harness.drain_events().iter().any(|e| matches!(
        e,
        ControllerEvent::EntityQueryError { entity_id, .. } if *entity_id == ENTITY_A
    )));
}

#[tokio::test]
async fn test_transient_failure_retried_on_tick() {
    let harness = Harness::new(discrete_config());
    let fake = FakeEntity::new(ENTITY_A);
    fake.fail_once(
        Request::Get(DynamicInfoQuery::AcquiredState),
        CommandStatus::TimedOut,
    );

    harness.enumerate(&fake);
    assert!(!harness.controller.is_advertised(ENTITY_A));
    assert_eq!(harness.controller.pending_requests(), 0);

    // Nothing is due yet.
    harness.controller.tick(Instant::now());
    assert!(harness.transport.is_idle());

    harness
        .controller
        .tick(Instant::now() + harness.controller.config().retry_delay);
    let requests = harness.pump(&[&fake]);

    assert_eq!(
        requests,
        vec![(ENTITY_A, Request::Get(DynamicInfoQuery::AcquiredState))]
    );
    assert!(harness.controller.is_advertised(ENTITY_A));
}

#[tokio::test]
async fn test_exhausted_retries_give_up_on_optional_query() {
    let harness = Harness::new(discrete_config());
    let fake = FakeEntity::new(ENTITY_A);
    for _ in 0..3 {
        fake.fail_once(
            Request::Get(DynamicInfoQuery::AcquiredState),
            CommandStatus::TimedOut,
        );
    }

    harness.enumerate(&fake);
    for _ in 0..2 {
        harness
            .controller
            .tick(Instant::now() + Duration::from_secs(5));
        harness.pump(&[&fake]);
    }

    let entity = harness.controller.entity_snapshot(ENTITY_A).unwrap();
    assert!(entity.is_advertised());
    assert_eq!(entity.acquire_state(), AcquireState::Undefined);
}

// ── Discovery ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_not_ready_entity_waits_for_update() {
    let harness = Harness::new(ControllerConfig::default());
    let fake = FakeEntity::new(ENTITY_A);
    let mut entity = fake.entity();
    entity
        .entity_capabilities
        .insert(EntityCapabilities::ENTITY_NOT_READY);

    harness.controller.on_entity_online(entity.clone());
    assert!(harness.transport.is_idle());
    assert!(harness.controller.entity_ids().is_empty());

    entity
        .entity_capabilities
        .remove(EntityCapabilities::ENTITY_NOT_READY);
    harness.controller.on_entity_update(entity);
    harness.pump(&[&fake]);

    assert!(harness.controller.is_advertised(ENTITY_A));
}

#[tokio::test]
async fn test_ignored_entity_is_never_enumerated() {
    let harness = Harness::new(ControllerConfig::default());
    let mut entity = FakeEntity::new(ENTITY_A).entity();
    entity
        .entity_capabilities
        .insert(EntityCapabilities::GENERAL_CONTROLLER_IGNORE);

    harness.controller.on_entity_online(entity);

    assert!(harness.transport.is_idle());
    assert!(harness.controller.entity_ids().is_empty());
}

#[tokio::test]
async fn test_responses_after_offline_are_dropped() {
    let mut harness = Harness::new(ControllerConfig::default());
    let fake = FakeEntity::new(ENTITY_A);

    harness.controller.on_entity_online(fake.entity());
    let in_flight = harness.transport.take();
    assert_eq!(in_flight.len(), 1);

    harness.controller.on_entity_offline(ENTITY_A);
    for (request_id, _, request) in in_flight {
        harness
            .controller
            .handle_response(request_id, fake.respond(&request));
    }

    assert!(harness.transport.is_idle());
    assert!(harness.controller.entity_ids().is_empty());
    assert_eq!(harness.controller.pending_requests(), 0);
    // Never advertised, so observers hear nothing.
    assert!(harness.drain_events().is_empty());
}

#[tokio::test]
async fn test_offline_notifies_and_updates_entity_list() {
    let mut harness = Harness::new(ControllerConfig::default());
    let list = harness.controller.entity_list();
    harness.enumerate(&FakeEntity::new(ENTITY_A));
    assert_eq!(list.borrow().as_slice(), &[ENTITY_A]);
    harness.drain_events();

    harness.controller.on_entity_offline(ENTITY_A);

    assert!(list.borrow().is_empty());
    assert_eq!(
        harness.drain_events(),
        vec![ControllerEvent::EntityOffline { entity_id: ENTITY_A }]
    );
}

#[tokio::test]
async fn test_discovery_update_changes_association() {
    let mut harness = Harness::new(ControllerConfig::default());
    let fake = FakeEntity::new(ENTITY_A);
    harness.enumerate(&fake);
    harness.drain_events();

    let mut entity = fake.entity();
    entity.association_id = Some(ENTITY_B);
    harness.controller.on_entity_update(entity);

    assert_eq!(
        harness.drain_events(),
        vec![
            ControllerEvent::AssociationIdChanged {
                entity_id: ENTITY_A,
                association_id: Some(ENTITY_B),
            },
            ControllerEvent::EntityUpdated { entity_id: ENTITY_A },
        ]
    );
}

// ── Notifications ───────────────────────────────────────────────────

#[tokio::test]
async fn test_unsolicited_name_change_updates_model() {
    let mut harness = Harness::new(ControllerConfig::default());
    harness.enumerate(&FakeEntity::new(ENTITY_A));
    harness.drain_events();

    harness.controller.on_unsolicited_response(
        ENTITY_A,
        ResponsePayload::Dynamic(DynamicInfo::EntityName("FOH Rack".into())),
    );

    assert_eq!(
        harness.drain_events(),
        vec![ControllerEvent::EntityNameChanged {
            entity_id: ENTITY_A,
            name: "FOH Rack".into(),
        }]
    );
    let name = harness
        .controller
        .with_entity(ENTITY_A, |e| e.model().unwrap().dynamic_model.entity_name.clone())
        .unwrap();
    assert_eq!(name, "FOH Rack");
    let counter = harness
        .controller
        .with_entity(ENTITY_A, |e| e.statistics().unsolicited_notification_counter)
        .unwrap();
    assert_eq!(counter, 1);
}

#[tokio::test]
async fn test_configuration_change_re_enumerates() {
    let mut harness = Harness::new(ControllerConfig::default());
    let fake = FakeEntity::new(ENTITY_A);
    harness.enumerate(&fake);
    harness.drain_events();

    harness.controller.on_unsolicited_response(
        ENTITY_A,
        ResponsePayload::Dynamic(DynamicInfo::CurrentConfiguration {
            configuration_index: 1,
        }),
    );
    assert!(!harness.controller.is_advertised(ENTITY_A));
    harness.pump(&[&fake]);

    assert_eq!(
        harness.drain_events(),
        vec![
            ControllerEvent::ConfigurationChanged {
                entity_id: ENTITY_A,
                configuration_index: 1,
            },
            ControllerEvent::EntityOffline { entity_id: ENTITY_A },
            ControllerEvent::EntityOnline { entity_id: ENTITY_A },
        ]
    );
    assert!(harness.controller.is_advertised(ENTITY_A));
}

#[tokio::test]
async fn test_aecp_statistics_are_counted() {
    let mut harness = Harness::new(ControllerConfig::default());
    harness.enumerate(&FakeEntity::new(ENTITY_A));
    harness.drain_events();

    harness.controller.on_aecp_timeout(ENTITY_A);
    harness.controller.on_aecp_retry(ENTITY_A);
    harness.controller.on_aecp_unexpected_response(ENTITY_A);
    harness
        .controller
        .on_aecp_response_time(ENTITY_A, Duration::from_millis(4));

    let stats = harness
        .controller
        .with_entity(ENTITY_A, |e| e.statistics().clone())
        .unwrap();
    assert_eq!(stats.aecp_timeout_counter, 1);
    assert_eq!(stats.aecp_retry_counter, 1);
    assert_eq!(stats.aecp_unexpected_response_counter, 1);
    assert_eq!(stats.aecp_response_count, 1);
    assert_eq!(stats.aecp_response_average_time, Duration::from_millis(4));
    assert_eq!(harness.drain_events().len(), 4);
}

#[tokio::test]
async fn test_duplicate_response_is_dropped_and_counted() {
    let harness = Harness::new(ControllerConfig::default());
    let fake = FakeEntity::new(ENTITY_A);
    harness.controller.on_entity_online(fake.entity());

    let mut batch = harness.transport.take().into_iter();
    let (request_id, _, request) = batch.next().unwrap();
    harness
        .controller
        .handle_response(request_id, fake.respond(&request));
    // The same answer shows up a second time.
    harness
        .controller
        .handle_response(request_id, fake.respond(&request));
    for (request_id, _, request) in batch {
        harness
            .controller
            .handle_response(request_id, fake.respond(&request));
    }
    harness.pump(&[&fake]);

    let entity = harness.controller.entity_snapshot(ENTITY_A).unwrap();
    assert!(entity.is_advertised());
    assert_eq!(entity.statistics().aecp_unexpected_response_counter, 1);
}

// ── Model contents ──────────────────────────────────────────────────

#[tokio::test]
async fn test_fanned_out_descriptors_are_contiguous() {
    let harness = Harness::new(ControllerConfig::default());
    let stream = |name: &str| {
        Descriptor::StreamInput(StreamDescriptor {
            object_name: name.into(),
            ..StreamDescriptor::default()
        })
    };
    let fake = FakeEntity::new(ENTITY_A)
        .with_descriptor(DescriptorType::StreamInput, 1, stream("In 2"))
        .with_descriptor(DescriptorType::StreamInput, 2, stream("In 3"));

    let requests = harness.enumerate(&fake);

    assert_eq!(descriptor_reads(&requests, DescriptorType::StreamInput), 3);
    let entity = harness.controller.entity_snapshot(ENTITY_A).unwrap();
    let configuration = entity.model().unwrap().current_configuration().unwrap();
    assert_eq!(configuration.indices(DescriptorType::StreamInput), vec![0, 1, 2]);
    assert_eq!(configuration.indices(DescriptorType::Control), vec![0]);
    assert_eq!(entity.compatibility_flags(), CompatibilityFlags::IEEE17221);
}

#[tokio::test]
async fn test_stream_connections_and_as_path_are_read() {
    let harness = Harness::new(discrete_config());
    let fake = FakeEntity::new(ENTITY_A);

    let requests = harness.enumerate(&fake);

    let connection_queries = requests
        .iter()
        .filter(|r| matches!(r, Request::Get(DynamicInfoQuery::OutputStreamConnection { .. })))
        .count();
    assert_eq!(connection_queries, 2);

    let entity = harness.controller.entity_snapshot(ENTITY_A).unwrap();
    assert!(entity.is_advertised());
    let configuration = entity.model().unwrap().current_configuration().unwrap();
    let input = configuration.stream_inputs[&0].dynamic_model.connection.unwrap();
    assert!(input.is_connected());
    assert_eq!(input.talker_stream.entity_id, PEER);
    let listeners: Vec<StreamIdentification> = configuration.stream_outputs[&0]
        .dynamic_model
        .connections
        .iter()
        .copied()
        .collect();
    assert_eq!(
        listeners,
        vec![
            StreamIdentification { entity_id: PEER, stream_index: 0 },
            StreamIdentification { entity_id: PEER, stream_index: 1 },
        ]
    );
    let as_path = configuration.avb_interfaces[&0].dynamic_model.as_path.clone().unwrap();
    assert_eq!(as_path.sequence, vec![0xAB, 0xCD]);
}

#[tokio::test]
async fn test_stream_format_change_is_announced() {
    let mut harness = Harness::new(ControllerConfig::default());
    harness.enumerate(&FakeEntity::new(ENTITY_A));
    harness.drain_events();

    let info = StreamInfo {
        stream_format: StreamFormat(0x00A0_0208_4000_0800),
        stream_id: 0x0A0B,
        ..StreamInfo::default()
    };
    harness.controller.on_unsolicited_response(
        ENTITY_A,
        ResponsePayload::Dynamic(DynamicInfo::StreamInfo {
            direction: StreamDirection::Input,
            stream_index: 0,
            info: info.clone(),
        }),
    );

    assert_eq!(
        harness.drain_events(),
        vec![
            ControllerEvent::StreamFormatChanged {
                entity_id: ENTITY_A,
                direction: StreamDirection::Input,
                stream_index: 0,
                format: StreamFormat(0x00A0_0208_4000_0800),
            },
            ControllerEvent::StreamInfoChanged {
                entity_id: ENTITY_A,
                direction: StreamDirection::Input,
                stream_index: 0,
                info,
            },
        ]
    );
}
