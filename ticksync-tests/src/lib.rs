// Copyright (c) The ticksync Authors.
// Licensed under the MIT License.

//! Integration tests for ticksync live under `tests/`.
