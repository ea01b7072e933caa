/*!

This is the long-form manual for `tally_engine` and `agoratally`.

## Counting pipeline

Each question of an election is counted on its own:

1. The delegations are resolved: every voter gets the ballot they cast, or the ballot
   of the member they delegate to, following chains of delegations. Voters caught in a
   cycle of delegations, or delegating to someone who never voted, have no ballot.
2. The ballots are encoded with the ids of the answers (1 for the first declared answer,
   and so on). Ballots that cannot be encoded are _dirty_ and do not take part in the count.
3. Identical ballots are grouped together with a weight.
4. The ballots are counted with the tally type of the question.

A ballot is dirty when:
- the voter has no ballot after resolving the delegations
- it is blank
- it contains an answer that is not part of the question
- it contains the same answer twice
- it selects fewer answers than the `min` of the question
- it selects more answers than the `max` of the question

## Tally types

### `ONE_CHOICE` and `MULTIPLE_CHOICE`

Each ballot adds its weight to every answer it selects. The `num_seats` answers with the
most votes win. Answers without any vote never win. Equal counts are ordered by
declaration order.

### `STV`

Ranked ballots counted with Meek STV. The quota is the Droop quota computed on the
ballots counted, `floor(votes / (num_seats + 1)) + 1`, and does not change during the count.

Each round:
- the surpluses of the elected candidates are transferred by lowering their keep factors
  until their values are within the precision of the quota
- all the hopeful candidates that reach the quota are elected, the highest first
- otherwise the hopeful candidate with the lowest value is eliminated

When the number of hopeful candidates is not larger than the number of open seats, the
candidates with a non zero value fill the seats. The count stops when all the seats are filled.

All the values are computed in fixed point with `digits_precision` decimal digits.

Ties are broken in two ways:
- the _strong_ tie break always gives an answer:
  - `index` (default): declaration order. The first declared candidate is elected first
    and the last declared candidate is eliminated first.
  - `alpha`: alphabetic order of the names, in the same way.
  - `random`: an order derived from a SHA-256 digest of the `random_seed`, the round and
    the name of each candidate. The order is hard to guess but always the same for a seed.
- the _weak_ tie break is used when eliminating a candidate:
  - `backward` (default): the candidate with the fewest votes in the previous round, going
    back one round at a time while candidates are still tied.
  - `forward`: the same, starting from the first round.
  - `strong`: uses the strong tie break directly.

## Input formats

### Election snapshot (`json`)

```text
{
  "name": "Board election",
  "votingEndsAt": 1700000000,
  "questions": [
    {
      "question": "Who should join the board?",
      "tally_type": "STV",
      "min": 0,
      "max": 3,
      "num_seats": 1,
      "answers": [
        {"value": "Anna", "url": "", "details": ""},
        {"value": "Bob"},
        {"value": "Clara"}
      ]
    }
  ],
  "votes": [
    {"voter": "v1", "answers": [["Anna", "Bob"]], "castAt": 1699000000},
    {"voter": "v2", "answers": [["Clara"]], "castAt": 1699000100, "invalidatedAt": 1699000200}
  ],
  "delegations": [
    {"voter": "v3", "delegate": "v1", "castAt": 1699000050, "sequence": 4}
  ],
  "tally": {"method": "MeekSTV", "strong_tie_break_method": "random", "random_seed": 12}
}
```

`votes[].answers` contains, for each question in order, the selected answer values.
When `votingEndsAt` is set, only the records cast until then are counted, and the
invalidations that happened later are ignored.

The records of a voter are ordered by `castAt`, then by `sequence`. When `sequence` is
missing, the position of the record in the file is used. Only the latest valid record of each
kind is used, and a direct vote always takes precedence over a delegation.

Accepted tally types: `ONE_CHOICE`, `MULTIPLE_CHOICE`, `STV` (also `MEEK-STV`, `BASE-STV`).

### `blt`

The ballot format of OpenSTV and related tools. Questions read from a BLT file are counted
with STV.

```text
3 1
2 1 2 0
1 3 0
0
"Anna"
"Bob"
"Clara"
"Who should join the board?"
```

The first line holds the number of candidates and the number of seats. Each ballot line
holds a weight, the ids of the choices in order, and a final `0`. Then come the candidate
names and the title. `agoratally` writes one such file per STV question in the directory
given by `--ballots-dir`, and counts the question from that file.

## Configuration

The options for STV questions are read from the `tally` section of the snapshot, or from
the file given with `--config`, which takes precedence:

- `method` (string, optional): only `MeekSTV` is supported.
- `strong_tie_break_method` (string, optional): `index`, `alpha` or `random`.
- `weak_tie_break_method` (string, optional): `backward`, `forward` or `strong`.
- `digits_precision` (number, optional): between 1 and 9, 6 by default.
- `random_seed` (number, optional): the seed of the `random` tie break, 0 by default.

## Output

`agoratally` prints a JSON summary with one entry per question:
`total_votes`, `dirty_votes`, `winners`, and for each answer `value`, `elected`,
`seat_number` and `total_count`. STV questions also report the quota and the rounds.
With `--reference`, the summary is compared to an expected one and the run fails
if they differ.

 */
