mod error;
mod stage;

pub use error::*;
pub use stage::*;

use crate::broadcaster::{broadcast, BroadcastResult};
use crate::client::{ChainDataGateway, EsploraClient, EsploraError};
use crate::helper::SendConfig;
use bitcoin::{consensus::encode::deserialize, OutPoint, Transaction, Txid};
use segsend_bitcoin_transactions::{
    select_utxo, utxo_info::UtxoInfo, KeyMaterial, PartiallySignedTransaction, Payment,
    SignedTransaction, TransactionBuilder, UnsignedTransaction,
};
use serde::Serialize;
use tracing::{debug, error, info};

/// What a successful run did.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SendReport {
    /// Txid answered by the relay
    pub txid: Txid,
    /// Txid computed from the signed transaction
    pub local_txid: Txid,
    /// The UTXO that was spent
    pub outpoint: OutPoint,
    pub amount: u64,
    /// Effective fee, including any change folded into it
    pub fee: u64,
    pub change: Option<u64>,
    pub raw_tx_hex: String,
}

/* -------------------------------------------------------------------------- */
/*                                STAGE OUTPUTS                               */
/* -------------------------------------------------------------------------- */
// Each stage consumes the previous stage's output, so stages cannot run out of order.

struct LoadedKeys {
    keys: KeyMaterial,
    payment: Payment,
    minimum_value: u64,
}

struct FetchedUtxos {
    loaded: LoadedKeys,
    utxos: Vec<UtxoInfo>,
}

struct SelectedUtxo {
    loaded: LoadedKeys,
    utxo: UtxoInfo,
}

struct FetchedSource {
    selected: SelectedUtxo,
    source_tx: Transaction,
}

struct BuiltTransaction {
    keys: KeyMaterial,
    utxo: UtxoInfo,
    amount: u64,
    unsigned: UnsignedTransaction,
}

struct SignedInputs {
    utxo: UtxoInfo,
    amount: u64,
    partially_signed: PartiallySignedTransaction,
}

struct FinalizedTransaction {
    utxo: UtxoInfo,
    amount: u64,
    fee: u64,
    change: Option<u64>,
    signed: SignedTransaction,
}

struct Broadcasted {
    finalized: FinalizedTransaction,
    result: BroadcastResult,
}

/* -------------------------------------------------------------------------- */
/*                                SEND PIPELINE                               */
/* -------------------------------------------------------------------------- */
/// Runs one payment from key loading to relay submission.
///
/// Stages run strictly in sequence and the first failure ends the run in
/// [`PipelineStage::Failed`]. Nothing is retried and a pipeline runs at most once; build a new
/// one to try again.
pub struct SendPipeline<G: ChainDataGateway> {
    config: SendConfig,
    gateway: G,
    stage: PipelineStage,
}

impl SendPipeline<EsploraClient> {
    /// Pipeline backed by the esplora service named in `config`, using its request timeout.
    pub fn with_esplora(config: SendConfig) -> Result<Self, EsploraError> {
        let gateway = EsploraClient::with_timeout(&config.esplora_url, config.request_timeout())?;

        Ok(Self::new(config, gateway))
    }
}

impl<G: ChainDataGateway> SendPipeline<G> {
    pub fn new(config: SendConfig, gateway: G) -> Self {
        Self {
            config,
            gateway,
            stage: PipelineStage::Idle,
        }
    }

    pub fn stage(&self) -> &PipelineStage {
        &self.stage
    }

    pub fn config(&self) -> &SendConfig {
        &self.config
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Executes every stage once.
    ///
    /// # Errors
    /// The returned [`PipelineError`] names the stage that could not be reached. Calling `run`
    /// again after the pipeline ended fails with [`PipelineFailure::AlreadyRun`] and leaves the
    /// stage as it was.
    pub fn run(&mut self) -> Result<SendReport, PipelineError> {
        if self.stage != PipelineStage::Idle {
            return Err(PipelineError::new(
                self.stage.clone(),
                PipelineFailure::AlreadyRun(self.stage.clone()),
            ));
        }

        match self.execute() {
            Ok(report) => Ok(report),
            Err(err) => {
                error!(stage = %err.stage, error = %err.failure, "send pipeline failed");
                self.stage = PipelineStage::Failed {
                    reason: err.failure.to_string(),
                };
                Err(err)
            }
        }
    }

    fn execute(&mut self) -> Result<SendReport, PipelineError> {
        let config = self.config.clone();

        let loaded = self.advance(PipelineStage::KeysLoaded, |_| {
            config.validate()?;
            let keys = config.load_key_material()?;
            let payment = config.payment()?;
            let minimum_value = config.min_utxo_value()?;

            info!(address = %keys.address(), network = %keys.network(), "loaded key material");
            Ok(LoadedKeys {
                keys,
                payment,
                minimum_value,
            })
        })?;

        let fetched = self.advance(PipelineStage::UtxosFetched, |gateway| {
            let utxos = gateway.fetch_utxos(loaded.keys.address())?;

            debug!(count = utxos.len(), "fetched utxos");
            Ok(FetchedUtxos { loaded, utxos })
        })?;

        let selected = self.advance(PipelineStage::UtxoSelected, |_| {
            let FetchedUtxos { loaded, utxos } = fetched;
            let utxo = select_utxo(&utxos, loaded.minimum_value)?.clone();

            info!(utxo = %utxo, value = utxo.value, "selected utxo");
            Ok(SelectedUtxo { loaded, utxo })
        })?;

        let fetched_source = self.advance(PipelineStage::SourceTxFetched, |gateway| {
            let raw_tx = gateway.fetch_raw_transaction(&selected.utxo.txid)?;
            let source_tx: Transaction = deserialize(&raw_tx).map_err(EsploraError::from)?;

            debug!(txid = %selected.utxo.txid, bytes = raw_tx.len(), "fetched source transaction");
            Ok(FetchedSource {
                selected,
                source_tx,
            })
        })?;

        let change_policy = config.change_policy;
        let built = self.advance(PipelineStage::Built, |_| {
            let FetchedSource {
                selected: SelectedUtxo { loaded, utxo },
                source_tx,
            } = fetched_source;

            let unsigned = TransactionBuilder::build(
                &utxo,
                &source_tx,
                &loaded.payment,
                loaded.keys.script_pubkey(),
                change_policy,
            )?;

            info!(fee = unsigned.fee(), change = ?unsigned.change(), "built transaction");
            Ok(BuiltTransaction {
                keys: loaded.keys,
                utxo,
                amount: loaded.payment.amount,
                unsigned,
            })
        })?;

        let signed_inputs = self.advance(PipelineStage::Signed, |_| {
            let BuiltTransaction {
                keys,
                utxo,
                amount,
                unsigned,
            } = built;
            let partially_signed = unsigned.sign(&keys, 0)?;

            Ok(SignedInputs {
                utxo,
                amount,
                partially_signed,
            })
        })?;

        let finalized = self.advance(PipelineStage::Finalized, |_| {
            let SignedInputs {
                utxo,
                amount,
                mut partially_signed,
            } = signed_inputs;
            let signed = partially_signed.finalize()?;

            debug!(txid = %signed.txid(), vsize = signed.vsize(), "finalized transaction");
            Ok(FinalizedTransaction {
                utxo,
                amount,
                fee: partially_signed.fee(),
                change: partially_signed.change(),
                signed,
            })
        })?;

        let broadcasted = self.advance(PipelineStage::Broadcast, |gateway| {
            let result = broadcast(&finalized.signed, gateway)?;

            Ok(Broadcasted { finalized, result })
        })?;

        let Broadcasted { finalized, result } = broadcasted;
        let report = SendReport {
            txid: result.txid,
            local_txid: result.local_txid,
            outpoint: finalized.utxo.outpoint(),
            amount: finalized.amount,
            fee: finalized.fee,
            change: finalized.change,
            raw_tx_hex: finalized.signed.to_hex(),
        };

        self.stage = PipelineStage::Done;
        info!(txid = %report.txid, "send pipeline done");

        Ok(report)
    }

    /// Runs one stage and, on success, records `next` as the current stage.
    fn advance<T>(
        &mut self,
        next: PipelineStage,
        step: impl FnOnce(&G) -> Result<T, PipelineFailure>,
    ) -> Result<T, PipelineError> {
        let output =
            step(&self.gateway).map_err(|failure| PipelineError::new(next.clone(), failure))?;

        info!(stage = %next, "pipeline stage reached");
        self.stage = next;

        Ok(output)
    }
}
