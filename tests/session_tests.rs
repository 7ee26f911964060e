//! Orchestration pass scenarios against scripted collaborators.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use ethers::types::transaction::eip712::TypedData;
use ethers::types::{Address, H256, U256};

use polytrader::chain::reader::ChainReader;
use polytrader::chain::{contract_config, derive_safe_address, ContractConfig};
use polytrader::relay::{DeployOutcome, RelayService, SafeTransaction};
use polytrader::session::credentials::CredentialEndpoint;
use polytrader::session::store::{MemorySessionStore, SessionStore};
use polytrader::session::SessionOrchestrator;
use polytrader::signer::WalletSigner;
use polytrader::types::{ApiCredentials, SessionStep};
use polytrader::CoreError;

struct FakeSigner {
    address: Address,
}

#[async_trait]
impl WalletSigner for FakeSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign_typed_data(&self, _typed: &TypedData) -> Result<String> {
        Ok(format!("0x{}", "ab".repeat(65)))
    }
}

/// Shared world the relay mutates and the reader observes.
struct ChainState {
    deployed: AtomicBool,
    allowance: Mutex<U256>,
}

struct FakeRelay {
    state: Arc<ChainState>,
    deploys: AtomicUsize,
    executes: AtomicUsize,
    fail_execute: AtomicBool,
}

impl FakeRelay {
    fn new(state: Arc<ChainState>) -> Self {
        Self {
            state,
            deploys: AtomicUsize::new(0),
            executes: AtomicUsize::new(0),
            fail_execute: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl RelayService for FakeRelay {
    async fn get_deployed(&self, _safe: Address) -> Result<bool> {
        Ok(self.state.deployed.load(Ordering::SeqCst))
    }

    async fn deploy(&self) -> Result<DeployOutcome> {
        self.deploys.fetch_add(1, Ordering::SeqCst);
        if self.state.deployed.swap(true, Ordering::SeqCst) {
            return Ok(DeployOutcome::AlreadyDeployed);
        }
        Ok(DeployOutcome::Deployed(H256::random()))
    }

    async fn execute(&self, txs: Vec<SafeTransaction>, _description: &str) -> Result<H256> {
        self.executes.fetch_add(1, Ordering::SeqCst);
        if self.fail_execute.load(Ordering::SeqCst) {
            return Err(anyhow!("relay rejected the batch"));
        }
        assert!(!txs.is_empty());
        *self.state.allowance.lock().unwrap() = U256::MAX;
        Ok(H256::random())
    }
}

struct FakeReader {
    state: Arc<ChainState>,
}

#[async_trait]
impl ChainReader for FakeReader {
    async fn code_size(&self, _address: Address) -> Result<usize> {
        Ok(if self.state.deployed.load(Ordering::SeqCst) {
            100
        } else {
            0
        })
    }

    async fn allowance(&self, _token: Address, _owner: Address, _spender: Address) -> Result<U256> {
        Ok(*self.state.allowance.lock().unwrap())
    }
}

struct FakeEndpoint {
    derives: AtomicUsize,
    creates: AtomicUsize,
    derive_succeeds: bool,
}

impl FakeEndpoint {
    fn fresh_wallet() -> Self {
        Self {
            derives: AtomicUsize::new(0),
            creates: AtomicUsize::new(0),
            derive_succeeds: false,
        }
    }
}

fn creds() -> ApiCredentials {
    ApiCredentials {
        key: "key".to_string(),
        secret: "secret".to_string(),
        passphrase: "pass".to_string(),
    }
}

#[async_trait]
impl CredentialEndpoint for FakeEndpoint {
    async fn derive_credentials(&self) -> Result<ApiCredentials> {
        self.derives.fetch_add(1, Ordering::SeqCst);
        if self.derive_succeeds {
            Ok(creds())
        } else {
            Err(anyhow!("no credential for wallet"))
        }
    }

    async fn create_credentials(&self) -> Result<ApiCredentials> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        Ok(creds())
    }
}

struct World {
    orchestrator: SessionOrchestrator,
    relay: Arc<FakeRelay>,
    endpoint: Arc<FakeEndpoint>,
    store: Arc<MemorySessionStore>,
    eoa: Address,
    contracts: ContractConfig,
}

fn fresh_world() -> World {
    let contracts = contract_config(137).unwrap();
    let eoa = Address::random();
    let state = Arc::new(ChainState {
        deployed: AtomicBool::new(false),
        allowance: Mutex::new(U256::zero()),
    });
    let relay = Arc::new(FakeRelay::new(state.clone()));
    let endpoint = Arc::new(FakeEndpoint::fresh_wallet());
    let store = Arc::new(MemorySessionStore::new());

    let relay_for_factory = relay.clone();
    let orchestrator = SessionOrchestrator::new(
        Arc::new(FakeSigner { address: eoa }),
        Arc::new(FakeReader { state }),
        store.clone(),
        endpoint.clone(),
        Box::new(move || Ok(relay_for_factory.clone() as Arc<dyn RelayService>)),
        contracts,
    );

    World {
        orchestrator,
        relay,
        endpoint,
        store,
        eoa,
        contracts,
    }
}

#[tokio::test]
async fn fresh_wallet_runs_all_three_steps() {
    let world = fresh_world();
    let session = world.orchestrator.initialize().await.unwrap();

    assert!(session.is_complete());
    assert_eq!(session.eoa_address, world.eoa);
    assert_eq!(
        session.safe_address,
        derive_safe_address(world.eoa, &world.contracts)
    );
    assert_eq!(world.orchestrator.current_step(), SessionStep::Complete);

    assert_eq!(world.relay.deploys.load(Ordering::SeqCst), 1);
    assert_eq!(world.endpoint.creates.load(Ordering::SeqCst), 1);
    assert_eq!(world.relay.executes.load(Ordering::SeqCst), 1);

    let persisted = world.store.load(world.eoa).await.unwrap().unwrap();
    assert!(persisted.is_complete());
}

#[tokio::test]
async fn second_pass_performs_no_additional_work() {
    let world = fresh_world();
    world.orchestrator.initialize().await.unwrap();
    let session = world.orchestrator.initialize().await.unwrap();

    assert!(session.is_complete());
    // Deployment, credentials, and approval all short-circuit.
    assert_eq!(world.relay.deploys.load(Ordering::SeqCst), 1);
    assert_eq!(world.endpoint.derives.load(Ordering::SeqCst), 1);
    assert_eq!(world.endpoint.creates.load(Ordering::SeqCst), 1);
    assert_eq!(world.relay.executes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failed_pass_keeps_previous_session_and_resets_to_idle() {
    let world = fresh_world();
    world.orchestrator.initialize().await.unwrap();

    // Allowance disappears and the relay starts rejecting.
    *world.relay.state.allowance.lock().unwrap() = U256::zero();
    world.relay.fail_execute.store(true, Ordering::SeqCst);

    let err = world.orchestrator.initialize().await.unwrap_err();
    assert!(err.to_string().contains("relay rejected"));
    assert_eq!(world.orchestrator.current_step(), SessionStep::Idle);

    // The complete session from the first pass is untouched.
    let persisted = world.store.load(world.eoa).await.unwrap().unwrap();
    assert!(persisted.is_complete());
}

#[tokio::test]
async fn relay_factory_failure_aborts_before_any_step() {
    let contracts = contract_config(137).unwrap();
    let eoa = Address::random();
    let state = Arc::new(ChainState {
        deployed: AtomicBool::new(false),
        allowance: Mutex::new(U256::zero()),
    });
    let store = Arc::new(MemorySessionStore::new());
    let orchestrator = SessionOrchestrator::new(
        Arc::new(FakeSigner { address: eoa }),
        Arc::new(FakeReader { state }),
        store.clone(),
        Arc::new(FakeEndpoint::fresh_wallet()),
        Box::new(|| Err(anyhow!("relay unreachable"))),
        contracts,
    );

    assert!(orchestrator.initialize().await.is_err());
    assert_eq!(orchestrator.current_step(), SessionStep::Idle);
    assert!(store.load(eoa).await.unwrap().is_none());
}

#[tokio::test]
async fn end_session_clears_persisted_state() {
    let world = fresh_world();
    world.orchestrator.initialize().await.unwrap();
    assert!(world.store.load(world.eoa).await.unwrap().is_some());
    assert!(world.orchestrator.relay_handle().is_some());

    world.orchestrator.end_session().await;
    assert_eq!(world.orchestrator.current_step(), SessionStep::Idle);
    assert!(world.store.load(world.eoa).await.unwrap().is_none());
    assert!(world.orchestrator.relay_handle().is_none());
}

#[tokio::test]
async fn sessions_are_isolated_per_eoa() {
    let world_a = fresh_world();
    let world_b = fresh_world();

    world_a.orchestrator.initialize().await.unwrap();

    assert!(world_a.store.load(world_a.eoa).await.unwrap().is_some());
    assert!(world_b.store.load(world_b.eoa).await.unwrap().is_none());
    assert_ne!(world_a.eoa, world_b.eoa);
}

/// Relay whose deployment query blocks until the test releases it.
struct BlockingRelay {
    gate: Mutex<Option<tokio::sync::oneshot::Receiver<()>>>,
}

#[async_trait]
impl RelayService for BlockingRelay {
    async fn get_deployed(&self, _safe: Address) -> Result<bool> {
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        Ok(true)
    }

    async fn deploy(&self) -> Result<DeployOutcome> {
        Ok(DeployOutcome::AlreadyDeployed)
    }

    async fn execute(&self, _txs: Vec<SafeTransaction>, _description: &str) -> Result<H256> {
        Ok(H256::random())
    }
}

#[tokio::test]
async fn second_initialize_is_rejected_while_one_is_in_flight() {
    let contracts = contract_config(137).unwrap();
    let eoa = Address::random();
    let state = Arc::new(ChainState {
        deployed: AtomicBool::new(true),
        allowance: Mutex::new(U256::MAX),
    });
    let (release, gate) = tokio::sync::oneshot::channel();
    let relay = Arc::new(BlockingRelay {
        gate: Mutex::new(Some(gate)),
    });
    let endpoint = Arc::new(FakeEndpoint {
        derives: AtomicUsize::new(0),
        creates: AtomicUsize::new(0),
        derive_succeeds: true,
    });

    let relay_for_factory = relay.clone();
    let orchestrator = Arc::new(SessionOrchestrator::new(
        Arc::new(FakeSigner { address: eoa }),
        Arc::new(FakeReader { state }),
        Arc::new(MemorySessionStore::new()),
        endpoint,
        Box::new(move || Ok(relay_for_factory.clone() as Arc<dyn RelayService>)),
        contracts,
    ));

    let first = tokio::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.initialize().await }
    });
    while orchestrator.current_step() == SessionStep::Idle {
        tokio::task::yield_now().await;
    }

    // The first pass is parked inside the deployment check.
    let err = orchestrator.initialize().await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<CoreError>(),
        Some(CoreError::Busy(_))
    ));

    release.send(()).unwrap();
    let session = first.await.unwrap().unwrap();
    assert!(session.is_complete());
    assert_eq!(orchestrator.current_step(), SessionStep::Complete);
}

#[tokio::test]
async fn persisted_credentials_are_reused_without_touching_the_endpoint() {
    let world = fresh_world();
    world.orchestrator.initialize().await.unwrap();

    // Fresh orchestrator over the same store and wallet, new endpoint.
    let endpoint = Arc::new(FakeEndpoint::fresh_wallet());
    let relay_for_factory = world.relay.clone();
    let orchestrator = SessionOrchestrator::new(
        Arc::new(FakeSigner { address: world.eoa }),
        Arc::new(FakeReader {
            state: world.relay.state.clone(),
        }),
        world.store.clone(),
        endpoint.clone(),
        Box::new(move || Ok(relay_for_factory.clone() as Arc<dyn RelayService>)),
        world.contracts,
    );

    let session = orchestrator.initialize().await.unwrap();
    assert!(session.is_complete());
    assert_eq!(endpoint.derives.load(Ordering::SeqCst), 0);
    assert_eq!(endpoint.creates.load(Ordering::SeqCst), 0);
}
