//! Cost estimation decorator
//!
//! After the wrapped provider answers, [`CostEstimator`] prices the token
//! usage against a caller-owned [`PricingTable`] and writes the USD cost into
//! the usage record. Streams get the same treatment on the packet carrying the
//! usage record; text chunks pass through untouched. Either way the request's
//! model names the price, falling back to the model the backend reports.

use crate::config::ProviderOptions;
use crate::core_types::{
    CallContext, ChatRequest, ChatResponse, PacketStream, Provider, StreamPacket, TokenUsage,
};
use crate::error::LlmResult;
use crate::logging::log_debug;
use arc_swap::ArcSwap;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

const TOKENS_PER_UNIT: f64 = 1_000_000.0;

/// Price of one model, in USD per million tokens
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ModelPrice {
    pub input_price: f64,
    pub output_price: f64,
}

impl ModelPrice {
    pub const fn new(input_price: f64, output_price: f64) -> Self {
        Self {
            input_price,
            output_price,
        }
    }

    /// Cost of the given usage at this price
    pub fn cost(&self, usage: &TokenUsage) -> f64 {
        (f64::from(usage.input_tokens) / TOKENS_PER_UNIT) * self.input_price
            + (f64::from(usage.output_tokens) / TOKENS_PER_UNIT) * self.output_price
    }
}

/// Model-name keyed price list
///
/// Lookup tries an exact key first. Otherwise every key contained in the
/// model name matches, and the longest such key wins (ties broken
/// alphabetically), so "gpt-4o-mini" prefers "gpt-4o" over "gpt-4".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PricingTable {
    prices: HashMap<String, ModelPrice>,
}

impl PricingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Well-known list prices for hosted models; local models are free
    pub fn standard() -> Self {
        [
            // OpenAI
            ("gpt-4o", ModelPrice::new(5.00, 15.00)),
            ("gpt-4-turbo", ModelPrice::new(10.00, 30.00)),
            ("gpt-3.5-turbo", ModelPrice::new(0.50, 1.50)),
            // Anthropic
            ("claude-3-5-sonnet", ModelPrice::new(3.00, 15.00)),
            ("claude-3-opus", ModelPrice::new(15.00, 75.00)),
            // Google
            ("gemini-1.5-pro", ModelPrice::new(3.50, 10.50)),
            ("gemini-1.5-flash", ModelPrice::new(0.35, 1.05)),
            // Local / Ollama
            ("tinyllama", ModelPrice::new(0.0, 0.0)),
            ("llama3", ModelPrice::new(0.0, 0.0)),
        ]
        .into_iter()
        .collect()
    }

    pub fn with_price(mut self, model: impl Into<String>, price: ModelPrice) -> Self {
        self.insert(model, price);
        self
    }

    pub fn insert(&mut self, model: impl Into<String>, price: ModelPrice) {
        self.prices.insert(model.into(), price);
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Resolve the price for a model name
    pub fn find(&self, model: &str) -> Option<ModelPrice> {
        if model.is_empty() {
            return None;
        }
        if let Some(price) = self.prices.get(model) {
            return Some(*price);
        }
        self.prices
            .iter()
            .filter(|(key, _)| !key.is_empty() && model.contains(key.as_str()))
            .max_by(|(a, _), (b, _)| a.len().cmp(&b.len()).then_with(|| b.cmp(a)))
            .map(|(_, price)| *price)
    }
}

impl<K: Into<String>> FromIterator<(K, ModelPrice)> for PricingTable {
    fn from_iter<I: IntoIterator<Item = (K, ModelPrice)>>(iter: I) -> Self {
        Self {
            prices: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Provider decorator that annotates usage with an estimated cost
pub struct CostEstimator<P> {
    inner: P,
    pricing: ArcSwap<PricingTable>,
}

impl<P> std::fmt::Debug for CostEstimator<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CostEstimator")
            .field("priced_models", &self.pricing.load().len())
            .finish_non_exhaustive()
    }
}

impl<P: Provider> CostEstimator<P> {
    pub fn new(inner: P, pricing: PricingTable) -> Self {
        Self {
            inner,
            pricing: ArcSwap::from_pointee(pricing),
        }
    }

    /// Replace the pricing table; in-flight calls keep the table they started with
    pub fn set_pricing(&self, pricing: PricingTable) {
        self.pricing.store(Arc::new(pricing));
    }

    pub fn pricing(&self) -> Arc<PricingTable> {
        self.pricing.load_full()
    }
}

fn apply_price(usage: &mut TokenUsage, price: Option<ModelPrice>) {
    if let Some(price) = price {
        if usage.input_tokens > 0 || usage.output_tokens > 0 {
            usage.cost_usd = price.cost(usage);
        }
    }
}

#[async_trait::async_trait]
impl<P: Provider> Provider for CostEstimator<P> {
    fn configure(&self, options: &ProviderOptions) -> LlmResult<()> {
        self.inner.configure(options)
    }

    async fn generate(&self, ctx: &CallContext, request: &ChatRequest) -> LlmResult<ChatResponse> {
        let mut response = self.inner.generate(ctx, request).await?;

        let model = if request.model.is_empty() {
            response.model.clone().unwrap_or_default()
        } else {
            request.model.clone()
        };
        let price = self.pricing.load().find(&model);
        if price.is_none() {
            log_debug!(model = %model, "No price known for model, cost left at zero");
        }
        apply_price(&mut response.usage, price);

        Ok(response)
    }

    async fn generate_stream(
        &self,
        ctx: &CallContext,
        request: &ChatRequest,
    ) -> LlmResult<PacketStream> {
        let source = self.inner.generate_stream(ctx, request).await?;
        let pricing = self.pricing.load_full();
        let requested = request.model.clone();

        let priced = source.map(move |packet| match packet {
            StreamPacket::Usage { mut usage, model } => {
                let resolved = if requested.is_empty() {
                    model.as_deref().unwrap_or_default()
                } else {
                    requested.as_str()
                };
                apply_price(&mut usage, pricing.find(resolved));
                StreamPacket::Usage { usage, model }
            }
            other => other,
        });
        Ok(priced.boxed())
    }

    fn name(&self) -> String {
        self.inner.name()
    }
}
