//! 署名前のトランザクションサイズ推定と手数料計算。
//!
//! 署名のバイト長は署名するまで確定しないため、入出力数だけから
//! 最小/最大サイズの幅を求め、その平均 (切り上げ) に手数料率を掛ける。
//! サイズは小数 (1/4バイト) になり得るので、内部では重み単位 (4 x バイト) で保持する。

use bitcoin::Amount;

use crate::types::FeeRate;

/// リレーノードが転送する最低手数料 (sats)
pub const MIN_RELAY_FEE: Amount = Amount::from_sat(1000);

const VERSION_LEN: u64 = 4;
const LOCKTIME_LEN: u64 = 4;
const MARKER_FLAG_LEN: u64 = 2;
const INPUT_NO_WITNESS_LEN: u64 = 59;
const INPUT_LEGACY_MIN_LEN: u64 = 146;
const INPUT_LEGACY_MAX_LEN: u64 = 148;
const OUTPUT_MIN_LEN: u64 = 31;
const OUTPUT_MAX_LEN: u64 = 33;
const WITNESS_MIN_LEN: u64 = 106;
const WITNESS_MAX_LEN: u64 = 108;
const WITNESS_SCALE: u64 = 4;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SizeEstimate {
    min_weight: u64,
    max_weight: u64,
}

impl SizeEstimate {
    pub fn min_weight(&self) -> u64 {
        self.min_weight
    }

    pub fn max_weight(&self) -> u64 {
        self.max_weight
    }

    pub fn min_bytes(&self) -> f64 {
        self.min_weight as f64 / WITNESS_SCALE as f64
    }

    pub fn max_bytes(&self) -> f64 {
        self.max_weight as f64 / WITNESS_SCALE as f64
    }

    /// ceil((min + max) / 2)
    pub fn mean_bytes(&self) -> u64 {
        let sum = self.min_weight.saturating_add(self.max_weight);
        sum.div_ceil(2 * WITNESS_SCALE)
    }
}

/// 件数を表す可変長整数のバイト長
pub fn varint_len(count: usize) -> u64 {
    if count < 0xfd {
        1
    } else if count < 0xffff {
        3
    } else {
        5
    }
}

pub fn estimate_size(input_count: usize, output_count: usize, witness_accounting: bool) -> SizeEstimate {
    let inputs = input_count as u64;
    let outputs = output_count as u64;
    let counts = varint_len(input_count) + varint_len(output_count);

    if witness_accounting {
        let base = counts + VERSION_LEN + MARKER_FLAG_LEN + LOCKTIME_LEN + INPUT_NO_WITNESS_LEN * inputs;
        let min_no_witness = base + OUTPUT_MIN_LEN * outputs;
        let max_no_witness = base + OUTPUT_MAX_LEN * outputs;
        let min_witness = min_no_witness + WITNESS_MIN_LEN * inputs;
        let max_witness = max_no_witness + WITNESS_MAX_LEN * inputs;
        SizeEstimate {
            min_weight: 3 * min_no_witness + min_witness,
            max_weight: 3 * max_no_witness + max_witness,
        }
    } else {
        let base = counts + VERSION_LEN + LOCKTIME_LEN;
        SizeEstimate {
            min_weight: WITNESS_SCALE * (base + INPUT_LEGACY_MIN_LEN * inputs + OUTPUT_MIN_LEN * outputs),
            max_weight: WITNESS_SCALE * (base + INPUT_LEGACY_MAX_LEN * inputs + OUTPUT_MAX_LEN * outputs),
        }
    }
}

pub fn estimate_fee(
    fee_rate: FeeRate,
    input_count: usize,
    output_count: usize,
    witness_accounting: bool,
) -> Amount {
    let mean = estimate_size(input_count, output_count, witness_accounting).mean_bytes();
    Amount::from_sat(mean.saturating_mul(fee_rate.sat_per_byte()))
}

/// 受取人1出力の送金に対する手数料。最低リレー手数料を下回らない。
pub fn relay_fee(fee_rate: FeeRate, input_count: usize) -> Amount {
    estimate_fee(fee_rate, input_count, 1, true).max(MIN_RELAY_FEE)
}
