// Shared fixtures for controller integration tests: a recording transport
// and a scripted fake entity that answers whatever the controller asks.

#![allow(dead_code, clippy::unwrap_used)]

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use avdecc_api::descriptor::IDENTIFY_CONTROL_TYPE;
use avdecc_api::{
    AsPath, AudioUnitDescriptor, AvbInterfaceDescriptor, ClockDomainDescriptor, CommandStatus,
    ConfigurationDescriptor, ControlDescriptor, ControlValues, Descriptor, DescriptorCounters,
    DescriptorType, DynamicInfo, DynamicInfoQuery, Entity, EntityCapabilities, EntityDescriptor,
    EntityId, EntityModelId, Error, LocaleDescriptor, MilanInfo, MilanVersion, PackedResult,
    ProtocolInterface, Request, RequestId, Response, ResponsePayload, SamplingRate,
    StreamDescriptor, StreamIdentification, StreamInputConnectionInfo, StringsDescriptor,
};
use avdecc_core::{Controller, ControllerConfig, ControllerEvent, EntityModelCache};

pub const CONTROLLER_ID: EntityId = EntityId::new(0x0011_22FF_FE33_4455);
pub const ENTITY_A: EntityId = EntityId::new(0x001B_92FF_FE00_00A1);
pub const ENTITY_B: EntityId = EntityId::new(0x001B_92FF_FE00_00B2);
/// Talker feeding the fake's input and listener of its output.
pub const PEER: EntityId = EntityId::new(0x001B_92FF_FE00_00C3);
pub const MODEL_ID: EntityModelId = EntityModelId::new(0x001B_9200_0000_0001);

// ── Recording transport ─────────────────────────────────────────────

/// Records every request and never answers on its own.
#[derive(Debug, Default)]
pub struct MockTransport {
    sent: Mutex<Vec<(RequestId, EntityId, Request)>>,
}

impl MockTransport {
    pub fn take(&self) -> Vec<(RequestId, EntityId, Request)> {
        std::mem::take(&mut *self.sent.lock())
    }

    pub fn is_idle(&self) -> bool {
        self.sent.lock().is_empty()
    }

    /// Requests queued so far, without taking them.
    pub fn peek(&self) -> Vec<Request> {
        self.sent.lock().iter().map(|(_, _, r)| r.clone()).collect()
    }
}

impl ProtocolInterface for MockTransport {
    fn controller_id(&self) -> EntityId {
        CONTROLLER_ID
    }

    fn send(&self, request_id: RequestId, target: EntityId, request: Request) -> Result<(), Error> {
        self.sent.lock().push((request_id, target, request));
        Ok(())
    }
}

// ── Fake entity ─────────────────────────────────────────────────────

/// A small stagebox: one configuration with an audio unit, one stream
/// each way, one interface, one clock domain, an identify control and
/// a single English locale.
pub struct FakeEntity {
    pub entity_id: EntityId,
    pub milan: bool,
    pub packed: bool,
    descriptors: BTreeMap<(DescriptorType, u16), Descriptor>,
    /// Requests that fail once with the given status, first match wins.
    scripted: Mutex<Vec<(Request, CommandStatus)>>,
    /// Dynamic queries that always fail, discrete or packed.
    query_failure: fn(&DynamicInfoQuery) -> Option<CommandStatus>,
}

fn no_failure(_: &DynamicInfoQuery) -> Option<CommandStatus> {
    None
}

impl FakeEntity {
    pub fn new(entity_id: EntityId) -> Self {
        let counts = BTreeMap::from([
            (DescriptorType::AudioUnit, 1),
            (DescriptorType::StreamInput, 1),
            (DescriptorType::StreamOutput, 1),
            (DescriptorType::AvbInterface, 1),
            (DescriptorType::Locale, 1),
            (DescriptorType::Strings, 1),
            (DescriptorType::Control, 1),
            (DescriptorType::ClockDomain, 1),
        ]);
        let descriptors = BTreeMap::from([
            (
                (DescriptorType::Entity, 0),
                Descriptor::Entity(EntityDescriptor {
                    entity_id,
                    entity_model_id: MODEL_ID,
                    entity_name: "Stagebox".into(),
                    firmware_version: "2.1.0".into(),
                    configurations_count: 1,
                    current_configuration: 0,
                    ..EntityDescriptor::default()
                }),
            ),
            (
                (DescriptorType::Configuration, 0),
                Descriptor::Configuration(ConfigurationDescriptor {
                    object_name: "Default".into(),
                    descriptor_counts: counts,
                    ..ConfigurationDescriptor::default()
                }),
            ),
            (
                (DescriptorType::AudioUnit, 0),
                Descriptor::AudioUnit(AudioUnitDescriptor {
                    current_sampling_rate: SamplingRate(48_000),
                    sampling_rates: [SamplingRate(48_000), SamplingRate(96_000)].into(),
                    ..AudioUnitDescriptor::default()
                }),
            ),
            (
                (DescriptorType::StreamInput, 0),
                Descriptor::StreamInput(StreamDescriptor {
                    object_name: "In 1".into(),
                    ..StreamDescriptor::default()
                }),
            ),
            (
                (DescriptorType::StreamOutput, 0),
                Descriptor::StreamOutput(StreamDescriptor {
                    object_name: "Out 1".into(),
                    ..StreamDescriptor::default()
                }),
            ),
            (
                (DescriptorType::AvbInterface, 0),
                Descriptor::AvbInterface(AvbInterfaceDescriptor::default()),
            ),
            (
                (DescriptorType::Locale, 0),
                Descriptor::Locale(LocaleDescriptor {
                    locale_id: "en-US".into(),
                    number_of_string_descriptors: 1,
                    base_string_descriptor_index: 0,
                }),
            ),
            (
                (DescriptorType::Strings, 0),
                Descriptor::Strings(StringsDescriptor {
                    strings: vec!["Acme".into(), "Stagebox 8".into()],
                }),
            ),
            (
                (DescriptorType::Control, 0),
                Descriptor::Control(ControlDescriptor {
                    object_name: "Identify".into(),
                    control_type: IDENTIFY_CONTROL_TYPE,
                    number_of_values: 1,
                    values: ControlValues(vec![0]),
                    ..ControlDescriptor::default()
                }),
            ),
            (
                (DescriptorType::ClockDomain, 0),
                Descriptor::ClockDomain(ClockDomainDescriptor {
                    object_name: "Domain".into(),
                    ..ClockDomainDescriptor::default()
                }),
            ),
        ]);

        Self {
            entity_id,
            milan: false,
            packed: true,
            descriptors,
            scripted: Mutex::new(Vec::new()),
            query_failure: no_failure,
        }
    }

    pub fn milan(mut self) -> Self {
        self.milan = true;
        self
    }

    pub fn without_packed(mut self) -> Self {
        self.packed = false;
        self
    }

    pub fn failing_queries(mut self, f: fn(&DynamicInfoQuery) -> Option<CommandStatus>) -> Self {
        self.query_failure = f;
        self
    }

    /// Replace (or add) a descriptor and keep the declared count in step.
    pub fn with_descriptor(
        mut self,
        descriptor_type: DescriptorType,
        descriptor_index: u16,
        descriptor: Descriptor,
    ) -> Self {
        self.descriptors
            .insert((descriptor_type, descriptor_index), descriptor);
        if matches!(
            descriptor_type,
            DescriptorType::Entity | DescriptorType::Configuration
        ) {
            return self;
        }
        let found = self
            .descriptors
            .keys()
            .filter(|(t, _)| *t == descriptor_type)
            .count();
        self.declare(descriptor_type, u16::try_from(found).unwrap())
    }

    /// Override how many descriptors of a type the configuration declares.
    pub fn declare(mut self, descriptor_type: DescriptorType, count: u16) -> Self {
        if let Some(Descriptor::Configuration(configuration)) =
            self.descriptors.get_mut(&(DescriptorType::Configuration, 0))
        {
            configuration.descriptor_counts.insert(descriptor_type, count);
        }
        self
    }

    /// Fail the next matching request once with `status`.
    pub fn fail_once(&self, request: Request, status: CommandStatus) {
        self.scripted.lock().push((request, status));
    }

    /// The discovery record the protocol layer would report.
    pub fn entity(&self) -> Entity {
        let mut entity = Entity::new(self.entity_id, MODEL_ID);
        if self.milan {
            entity
                .entity_capabilities
                .insert(EntityCapabilities::VENDOR_UNIQUE_SUPPORTED);
        }
        entity
    }

    pub fn respond(&self, request: &Request) -> Response {
        {
            let mut scripted = self.scripted.lock();
            if let Some(position) = scripted.iter().position(|(r, _)| r == request) {
                let (_, status) = scripted.remove(position);
                return Response::failure(status);
            }
        }

        match request {
            Request::GetMilanInfo if self.milan => Response::success(ResponsePayload::MilanInfo(
                MilanInfo {
                    protocol_version: 1,
                    features_flags: 0,
                    certification_version: MilanVersion::V1_2,
                },
            )),
            Request::GetMilanInfo => Response::failure(CommandStatus::NotImplemented),
            Request::ReadDescriptor {
                descriptor_type,
                descriptor_index,
                ..
            } => self
                .descriptors
                .get(&(*descriptor_type, *descriptor_index))
                .cloned()
                .map_or_else(
                    || Response::failure(CommandStatus::NoSuchDescriptor),
                    Response::descriptor,
                ),
            Request::Get(query) => match (self.query_failure)(query) {
                Some(status) => Response::failure(status),
                None => Response::dynamic(answer(query)),
            },
            Request::GetDynamicInfo(_) if !self.packed => {
                Response::failure(CommandStatus::NotImplemented)
            }
            Request::GetDynamicInfo(queries) => Response::success(ResponsePayload::Packed(
                queries
                    .iter()
                    .map(|query| match (self.query_failure)(query) {
                        Some(status) => PackedResult {
                            status,
                            value: None,
                        },
                        None => PackedResult {
                            status: CommandStatus::Success,
                            value: Some(answer(query)),
                        },
                    })
                    .collect(),
            )),
            Request::AcquireEntity { .. } => Response::dynamic(DynamicInfo::AcquiredState {
                owner: CONTROLLER_ID,
            }),
            Request::ReleaseEntity => Response::dynamic(DynamicInfo::AcquiredState {
                owner: EntityId::NULL,
            }),
            Request::LockEntity => Response::dynamic(DynamicInfo::LockedState {
                locker: CONTROLLER_ID,
            }),
            Request::UnlockEntity => Response::dynamic(DynamicInfo::LockedState {
                locker: EntityId::NULL,
            }),
            Request::StartOperation { .. } => {
                Response::success(ResponsePayload::OperationStarted { operation_id: 7 })
            }
            _ => Response::success(ResponsePayload::None),
        }
    }
}

/// The value the fake reports for a dynamic query.
fn answer(query: &DynamicInfoQuery) -> DynamicInfo {
    match *query {
        DynamicInfoQuery::AcquiredState => DynamicInfo::AcquiredState {
            owner: EntityId::NULL,
        },
        DynamicInfoQuery::LockedState => DynamicInfo::LockedState {
            locker: EntityId::NULL,
        },
        DynamicInfoQuery::ObjectName {
            configuration_index,
            descriptor_type,
            descriptor_index,
        } => DynamicInfo::ObjectName {
            configuration_index,
            descriptor_type,
            descriptor_index,
            name: String::new(),
        },
        DynamicInfoQuery::SamplingRate { audio_unit_index } => DynamicInfo::SamplingRate {
            audio_unit_index,
            sampling_rate: SamplingRate(48_000),
        },
        DynamicInfoQuery::ClockSource { clock_domain_index } => DynamicInfo::ClockSource {
            clock_domain_index,
            clock_source_index: 0,
        },
        DynamicInfoQuery::ControlValues { control_index } => DynamicInfo::ControlValues {
            control_index,
            values: ControlValues(vec![0]),
        },
        DynamicInfoQuery::MemoryObjectLength {
            configuration_index,
            memory_object_index,
        } => DynamicInfo::MemoryObjectLength {
            configuration_index,
            memory_object_index,
            length: 0,
        },
        DynamicInfoQuery::StreamInfo {
            direction,
            stream_index,
        } => DynamicInfo::StreamInfo {
            direction,
            stream_index,
            info: avdecc_api::StreamInfo {
                stream_id: 0x0A0B,
                ..avdecc_api::StreamInfo::default()
            },
        },
        DynamicInfoQuery::AvbInfo {
            avb_interface_index,
        } => DynamicInfo::AvbInfo {
            avb_interface_index,
            info: avdecc_api::AvbInfo {
                gptp_grandmaster_id: 0xAB,
                ..avdecc_api::AvbInfo::default()
            },
        },
        DynamicInfoQuery::Counters {
            descriptor_type,
            descriptor_index,
        } => DynamicInfo::Counters {
            descriptor_type,
            descriptor_index,
            counters: DescriptorCounters::default(),
        },
        DynamicInfoQuery::AudioMap {
            direction,
            stream_port_index,
            map_index,
        } => DynamicInfo::AudioMap {
            direction,
            stream_port_index,
            map_index,
            number_of_maps: 1,
            mappings: Vec::new(),
        },
        DynamicInfoQuery::InputStreamState { stream_index } => DynamicInfo::InputStreamState {
            stream_index,
            connection: StreamInputConnectionInfo::connected(StreamIdentification {
                entity_id: PEER,
                stream_index: 0,
            }),
        },
        DynamicInfoQuery::OutputStreamState { stream_index } => DynamicInfo::OutputStreamState {
            stream_index,
            connection_count: 2,
        },
        DynamicInfoQuery::OutputStreamConnection {
            stream_index,
            connection_index,
        } => DynamicInfo::OutputStreamConnection {
            stream_index,
            connection_index,
            listener_stream: StreamIdentification {
                entity_id: PEER,
                stream_index: connection_index,
            },
        },
        DynamicInfoQuery::AsPath {
            avb_interface_index,
        } => DynamicInfo::AsPath {
            avb_interface_index,
            as_path: AsPath {
                sequence: vec![0xAB, 0xCD],
            },
        },
    }
}

// ── Harness ─────────────────────────────────────────────────────────

pub struct Harness {
    pub controller: Controller,
    pub transport: Arc<MockTransport>,
    pub events: broadcast::Receiver<ControllerEvent>,
}

impl Harness {
    pub fn new(config: ControllerConfig) -> Self {
        Self::with_cache(config, Arc::new(EntityModelCache::new()))
    }

    pub fn with_cache(config: ControllerConfig, cache: Arc<EntityModelCache>) -> Self {
        let transport = Arc::new(MockTransport::default());
        let controller = Controller::new(config, transport.clone(), cache);
        let events = controller.events();
        Self {
            controller,
            transport,
            events,
        }
    }

    /// Answer every outstanding request, and everything those answers
    /// trigger, until the controller goes quiet. Returns what was asked.
    pub fn pump(&self, fakes: &[&FakeEntity]) -> Vec<(EntityId, Request)> {
        let mut seen = Vec::new();
        loop {
            let batch = self.transport.take();
            if batch.is_empty() {
                return seen;
            }
            for (request_id, target, request) in batch {
                let fake = fakes
                    .iter()
                    .find(|fake| fake.entity_id == target)
                    .unwrap();
                let response = fake.respond(&request);
                seen.push((target, request));
                self.controller.handle_response(request_id, response);
            }
        }
    }

    /// Bring `fake` online and enumerate it to completion.
    pub fn enumerate(&self, fake: &FakeEntity) -> Vec<Request> {
        self.controller.on_entity_online(fake.entity());
        self.pump(&[fake]).into_iter().map(|(_, r)| r).collect()
    }

    /// Let spawned tasks run until one of them sends something.
    pub async fn wait_for_request(&self) {
        for _ in 0..1000 {
            if !self.transport.is_idle() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("no request was sent");
    }

    pub fn drain_events(&mut self) -> Vec<ControllerEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

pub fn discrete_config() -> ControllerConfig {
    ControllerConfig {
        packed_dynamic_info: false,
        ..ControllerConfig::default()
    }
}
